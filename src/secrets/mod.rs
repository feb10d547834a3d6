//! # Secrets
//!
//! Everything between an access token and a rendered secret:
//!
//! - [`spec`]: alias-to-path declarations parsed from annotations
//! - [`group`]: secret groups resolved from pod annotations
//! - [`templates`]: Tera templates and the derived per-format templates
//! - [`path`]: destination paths confined to the secrets directory
//! - [`conjur`]: batch retrieval from the vault
//!
//! Secret values are carried as [`SecretBytes`], which never prints its
//! contents and zeroes its memory on drop.

pub mod annotations;
pub mod conjur;
pub mod group;
pub mod path;
pub mod push;
pub mod spec;
pub mod templates;
pub mod types;

pub use conjur::{
    parse_variable_id, variable_id, ConjurRetrieverFactory, ConjurSecretsRetriever,
    RetrieverFactory, SecretsRetriever,
};
pub use group::{new_secret_groups, SecretGroup, DEFAULT_FILE_PERMISSIONS};
pub use spec::{parse_secret_specs, SecretSpec};
pub use templates::FileFormat;
pub use types::{Secret, SecretBytes};
