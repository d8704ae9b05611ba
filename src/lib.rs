pub mod client;
pub mod config;
pub mod fetch;
pub mod parser;
pub mod schedule;
pub mod server;
pub mod stops;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
