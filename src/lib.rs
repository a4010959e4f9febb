//! Wedding site backend: a registry listed from a Google Sheet, and a
//! purchase flow that marks items bought and emails the couple.

pub mod config;
pub mod model;
pub mod notify;
pub mod purchase;
pub mod registry;
pub mod sheets;
pub mod title;
pub mod web;
