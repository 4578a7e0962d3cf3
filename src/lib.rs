//! Topology expansion and device configuration rendering.
//!
//! A [`models::DesignTemplate`] is expanded into concrete devices, interfaces,
//! cables and services ([`expand`]), with addresses and AS numbers drawn from
//! bounded pools ([`ipam`]) and persisted through a [`db::TopologyStore`]. Each
//! device is then queried back, normalized ([`normalize`], [`classify`]),
//! rendered to vendor configuration ([`render`]) and validated ([`validate`]).

pub mod classify;
pub mod config;
pub mod db;
pub mod expand;
pub mod ipam;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod utils;
pub mod validate;
