//! Data models for catalog entities.
//!
//! - `CatalogItem`: the domain type every layer passes around
//! - `BreedResponse`, `ImageResponse`: Cat API payloads and their conversion

pub mod breed;

pub use breed::{BreedResponse, CatalogItem, ImageResponse, TraitScores, WeightResponse};
