mod bids;
mod common;
mod notifications;
