//! SAML 2.0 metadata.
//!
//! [`MetadataBuilder`] publishes this SP; [`parse_metadata`] reads partner
//! metadata into records the [`PartnerRegistry`](crate::options::PartnerRegistry)
//! can hold.

mod builder;
mod parser;

pub use builder::MetadataBuilder;
pub use parser::{
    Endpoint, IdpDescriptor, MetadataTrust, PartnerMetadata, SpDescriptor, parse_metadata,
};
