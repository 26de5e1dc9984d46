pub mod api;
pub mod broadcast;
pub mod config;
pub mod humanize;
pub mod ledger;
pub mod maintenance;
pub mod observability;
pub mod queue;
pub mod ratelimit;
pub mod session;
pub mod synclog;
pub mod taskwarrior;
