//! Stomp core: effect algorithms, parameters and configuration

pub mod domain;
