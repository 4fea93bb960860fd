//! shelfscrape: headless-browser price scraper for supermarket listings.
//!
//! A run loads one category listing in Chromium, reads the name and price of
//! every product card, and bulk-inserts the prices into a PostgREST store.

pub mod cli;
pub mod config;
pub mod models;
pub mod repository;
pub mod scrapers;
pub mod services;
