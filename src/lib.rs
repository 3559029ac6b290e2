pub mod config;
pub mod countries;
pub mod data;
pub mod error;
pub mod grouping;
pub mod logging;
pub mod options;
pub mod plotting;
pub mod releases;
pub mod reliability;
pub mod storage;
