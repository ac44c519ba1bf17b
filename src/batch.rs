//! Feed batch documents as handed to `skytrack ingest`.

use serde::Deserialize;
use skytrack_tracking::{PositionUpdate, StaticAttributes};
use std::io::Read;

#[derive(Debug, Default, Deserialize)]
pub struct Batch {
    pub positions: Vec<PositionUpdate>,
    #[serde(default, rename = "static")]
    pub attributes: Vec<StaticAttributes>,
}
impl Batch {
    pub fn from_reader(reader: impl Read) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }
}
