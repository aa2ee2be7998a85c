//! Domain layer - provider-independent reply logic.

pub mod reply;
