//! runcast: episodic browser-run orchestrator with live event broadcast.
//!
//! `POST /run` accepts a goal or explicit episode list, drives an automation
//! agent through bounded episodes against a browser page on a detached task,
//! and streams typed events to WebSocket subscribers in per-run rooms.

pub mod blocked;
pub mod config;
pub mod executor;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod screencast;
pub mod server;
