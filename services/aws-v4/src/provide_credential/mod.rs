mod anonymous;
pub use anonymous::AnonymousCredentialProvider;

mod default;
pub use default::{default_credential_provider, DefaultCredentialProvider};

mod env;
pub use env::EnvCredentialProvider;

mod imds;
pub use imds::IMDSv2CredentialProvider;

mod profile;
pub use profile::ProfileCredentialProvider;

mod r#static;
pub use r#static::StaticCredentialProvider;
