//! Provider adapter implementations.
//!
//! One module per upstream provider. Each exposes a unit struct
//! implementing [`SourceAdapter`](crate::SourceAdapter) plus a
//! `parse_<provider>_response` convenience function.

pub mod ambient;
pub mod html;
pub mod metar;
pub mod nws;
pub mod synoptic;
pub mod tempest;
pub mod weatherlink;
