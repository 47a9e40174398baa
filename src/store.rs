//! Versioned on-disk storage
//!
//! Bundles (and generated scripts) are stored as `{name}_{timestamp}.{extension}` files. The
//! shared lookup rules live in [`versioned`].

/// Name + timestamp indexed files with nearest-version lookup
pub mod versioned;

/// JSON schema validation of bundle documents
pub mod schema;

/// Save, append and load job bundles
pub mod bundle;

pub use bundle::BundleStore;
pub use versioned::VersionedStore;
