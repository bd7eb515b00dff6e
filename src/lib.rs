//! Sentinel - Adaptive Trading Parameter Tuner Library
//!
//! Learns how trading parameters correlate with performance and turns that
//! into parameter recommendations that are safe to apply.
//!
//! # Modules
//!
//! - `domain`: Core types (Recommendation, ParameterBound, CorrelationModel, ClosedTrade)
//! - `ports`: Trait abstractions (ParameterStore, TradeHistory)
//! - `strategy`: Recommendation generation, validation pipeline, feedback loop, mode policy
//! - `adapters`: External implementations (JSON files, in-memory, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Adjuster and mode switcher use cases

pub mod domain;
pub mod ports;
pub mod strategy;
pub mod adapters;
pub mod config;
pub mod application;
