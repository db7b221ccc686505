//! OpenAPI document of the Bill Burner proxy, rendered at build time.

pub const OPENAPI_JSON: &str = include_str!(concat!(env!("OUT_DIR"), "/openapi.json"));
