// AI generation core: deterministic prompts, the resilient provider path
// (cache -> circuit breaker -> retry -> fallback), ranking parsing and image URLs.
// All provider calls go through resilient::ResilientCaller.

pub mod cache;
pub mod circuit_breaker;
pub mod handlers;
pub mod image;
pub mod prompt_builder;
pub mod prompts;
pub mod ranking;
pub mod request;
pub mod resilient;
pub mod retry;
pub mod service;
pub mod validation;
