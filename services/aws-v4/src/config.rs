// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use awsign_core::utils::Redact;
use awsign_core::{Context, Error, Result};
use ini::Ini;
use log::debug;

use crate::constants::*;

/// Config carries all the configuration for AWS services.
#[derive(Clone)]
pub struct Config {
    /// `config_file` will be loaded from:
    ///
    /// - env value: [`AWS_CONFIG_FILE`]
    /// - default to: `~/.aws/config`
    pub config_file: String,
    /// `shared_credentials_file` will be loaded from:
    ///
    /// - env value: [`AWS_SHARED_CREDENTIALS_FILE`]
    /// - default to: `~/.aws/credentials`
    pub shared_credentials_file: String,
    /// `profile` will be loaded from:
    ///
    /// - env value: [`AWS_PROFILE`]
    /// - default to: `default`
    pub profile: String,

    /// `region` will be loaded from:
    ///
    /// - env value: [`AWS_REGION`], then [`AWS_DEFAULT_REGION`]
    /// - profile config: `region`
    pub region: Option<String>,
    /// `access_key_id` will be loaded from
    ///
    /// - env value: [`AWS_ACCESS_KEY_ID`]
    /// - profile config: `aws_access_key_id`
    pub access_key_id: Option<String>,
    /// `secret_access_key` will be loaded from
    ///
    /// - env value: [`AWS_SECRET_ACCESS_KEY`]
    /// - profile config: `aws_secret_access_key`
    pub secret_access_key: Option<String>,
    /// `session_token` will be loaded from
    ///
    /// - env value: [`AWS_SESSION_TOKEN`]
    /// - profile config: `aws_session_token`
    pub session_token: Option<String>,
    /// `ec2_metadata_disabled` value will be loaded from:
    ///
    /// - env value: [`AWS_EC2_METADATA_DISABLED`]
    pub ec2_metadata_disabled: bool,
    /// `ec2_metadata_endpoint` value will be loaded from:
    ///
    /// - env value: [`AWS_EC2_METADATA_SERVICE_ENDPOINT`]
    /// - default to: `http://169.254.169.254`
    pub ec2_metadata_endpoint: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_file: "~/.aws/config".to_string(),
            shared_credentials_file: "~/.aws/credentials".to_string(),
            profile: "default".to_string(),
            region: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            ec2_metadata_disabled: false,
            ec2_metadata_endpoint: "http://169.254.169.254".to_string(),
        }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("config_file", &self.config_file)
            .field("shared_credentials_file", &self.shared_credentials_file)
            .field("profile", &self.profile)
            .field("region", &self.region)
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("ec2_metadata_disabled", &self.ec2_metadata_disabled)
            .field("ec2_metadata_endpoint", &self.ec2_metadata_endpoint)
            .finish()
    }
}

impl Config {
    /// Load config from env.
    pub fn from_env(mut self, ctx: &Context) -> Self {
        if let Some(v) = ctx.env_var(AWS_CONFIG_FILE) {
            self.config_file = v;
        }
        if let Some(v) = ctx.env_var(AWS_SHARED_CREDENTIALS_FILE) {
            self.shared_credentials_file = v;
        }
        if let Some(v) = ctx.env_var(AWS_PROFILE) {
            self.profile = v;
        }
        if let Some(v) = ctx
            .env_var(AWS_REGION)
            .or_else(|| ctx.env_var(AWS_DEFAULT_REGION))
        {
            self.region = Some(v);
        }
        if let Some(v) = ctx.env_var(AWS_ACCESS_KEY_ID) {
            self.access_key_id = Some(v);
        }
        if let Some(v) = ctx.env_var(AWS_SECRET_ACCESS_KEY) {
            self.secret_access_key = Some(v);
        }
        if let Some(v) = ctx.env_var(AWS_SESSION_TOKEN) {
            self.session_token = Some(v);
        }
        if let Some(v) = ctx.env_var(AWS_EC2_METADATA_DISABLED) {
            self.ec2_metadata_disabled = v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = ctx.env_var(AWS_EC2_METADATA_SERVICE_ENDPOINT) {
            self.ec2_metadata_endpoint = v.trim_end_matches('/').to_string();
        }
        self
    }

    /// Overlay values found in the profile of the config file and the shared
    /// credentials file.
    ///
    /// Values already set are replaced by the ones from the files. Missing or
    /// broken files are skipped.
    pub async fn load_profile(mut self, ctx: &Context) -> Self {
        match load_config_file_profile(ctx, &self.config_file, &self.profile).await {
            Ok(Some(props)) => {
                if let Some(v) = props.get("region") {
                    self.region = Some(v.clone());
                }
                self.overlay_keys(&props);
            }
            Ok(None) => {}
            Err(err) => debug!("load profile from config file failed: {err}"),
        }

        match load_profile_section(ctx, &self.shared_credentials_file, &self.profile).await {
            Ok(Some(props)) => self.overlay_keys(&props),
            Ok(None) => {}
            Err(err) => debug!("load profile from shared credentials file failed: {err}"),
        }

        self
    }

    fn overlay_keys(&mut self, props: &HashMap<String, String>) {
        if let Some(v) = props.get("aws_access_key_id") {
            self.access_key_id = Some(v.clone());
        }
        if let Some(v) = props.get("aws_secret_access_key") {
            self.secret_access_key = Some(v.clone());
        }
        if let Some(v) = props.get("aws_session_token") {
            self.session_token = Some(v.clone());
        }
    }
}

/// Section name of `profile` inside the config file.
///
/// Only the default profile keeps its bare name there, all others are
/// written as `[profile <name>]`.
pub(crate) fn config_file_section(profile: &str) -> String {
    match profile {
        "default" => "default".to_string(),
        x => format!("profile {x}"),
    }
}

/// Load the section of `profile` from the config file at `path`.
pub(crate) async fn load_config_file_profile(
    ctx: &Context,
    path: &str,
    profile: &str,
) -> Result<Option<HashMap<String, String>>> {
    load_profile_section(ctx, path, &config_file_section(profile)).await
}

/// Load one section of an INI file as key-value pairs.
///
/// Returns `Ok(None)` if the file can't be read or the section doesn't exist.
pub(crate) async fn load_profile_section(
    ctx: &Context,
    path: &str,
    section: &str,
) -> Result<Option<HashMap<String, String>>> {
    let Some(path) = ctx.expand_home_dir(path) else {
        debug!("failed to expand homedir for path: {path}");
        return Ok(None);
    };

    let content = match ctx.file_read_as_string(&path).await {
        Ok(content) => content,
        Err(err) => {
            debug!("failed to read profile file {path}: {err}");
            return Ok(None);
        }
    };

    let conf = Ini::load_from_str(&content).map_err(|e| {
        Error::config_invalid("failed to parse profile file")
            .with_source(anyhow::Error::new(e))
            .with_context(format!("path: {path}"))
    })?;

    let Some(props) = conf.section(Some(section)) else {
        debug!("section {section} not found in {path}");
        return Ok(None);
    };

    Ok(Some(
        props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use awsign_core::StaticEnv;
    use awsign_file_read_tokio::TokioFileRead;
    use pretty_assertions::assert_eq;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn ctx_with(envs: &[(&str, &str)]) -> Context {
        Context::new()
            .with_file_read(TokioFileRead)
            .with_env(StaticEnv {
                home_dir: None,
                envs: envs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            })
    }

    #[test]
    fn test_config_from_env() {
        let ctx = ctx_with(&[
            (AWS_PROFILE, "dev"),
            (AWS_DEFAULT_REGION, "eu-west-1"),
            (AWS_ACCESS_KEY_ID, "ak"),
            (AWS_SECRET_ACCESS_KEY, "sk"),
            (AWS_EC2_METADATA_DISABLED, "TRUE"),
            (AWS_EC2_METADATA_SERVICE_ENDPOINT, "http://127.0.0.1:1338/"),
        ]);

        let config = Config::default().from_env(&ctx);
        assert_eq!(config.profile, "dev");
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.access_key_id.as_deref(), Some("ak"));
        assert_eq!(config.secret_access_key.as_deref(), Some("sk"));
        assert!(config.ec2_metadata_disabled);
        assert_eq!(config.ec2_metadata_endpoint, "http://127.0.0.1:1338");
    }

    #[test]
    fn test_aws_region_wins_over_default_region() {
        let ctx = ctx_with(&[(AWS_REGION, "us-west-2"), (AWS_DEFAULT_REGION, "eu-west-1")]);

        let config = Config::default().from_env(&ctx);
        assert_eq!(config.region.as_deref(), Some("us-west-2"));
    }

    #[test]
    fn test_config_debug_is_redacted() {
        let config = Config {
            secret_access_key: Some("wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY".to_string()),
            ..Default::default()
        };
        let s = format!("{config:?}");
        assert!(!s.contains("wJalrXUtnFEMI"), "{s}");
    }

    #[tokio::test]
    async fn test_config_load_profile() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let tmp_dir = tempdir()?;
        let config_path = tmp_dir.path().join("config");
        let mut f = File::create(&config_path)?;
        writeln!(f, "[default]")?;
        writeln!(f, "region = us-east-1")?;
        writeln!(f)?;
        writeln!(f, "[profile profile1]")?;
        writeln!(f, "region = ap-northeast-1")?;
        writeln!(f, "aws_access_key_id = CONFIGACCESSKEYID")?;

        let credentials_path = tmp_dir.path().join("credentials");
        let mut f = File::create(&credentials_path)?;
        writeln!(f, "[profile1]")?;
        writeln!(f, "aws_access_key_id = PROFILE1ACCESSKEYID")?;
        writeln!(f, "aws_secret_access_key = PROFILE1SECRETACCESSKEY")?;
        writeln!(f, "aws_session_token = PROFILE1SESSIONTOKEN")?;

        let config_path = config_path.to_string_lossy().to_string();
        let credentials_path = credentials_path.to_string_lossy().to_string();
        let ctx = ctx_with(&[
            (AWS_PROFILE, "profile1"),
            (AWS_CONFIG_FILE, config_path.as_str()),
            (AWS_SHARED_CREDENTIALS_FILE, credentials_path.as_str()),
        ]);

        let config = Config::default().from_env(&ctx).load_profile(&ctx).await;
        assert_eq!(config.profile, "profile1");
        assert_eq!(config.region.as_deref(), Some("ap-northeast-1"));
        // The shared credentials file is applied last.
        assert_eq!(config.access_key_id.as_deref(), Some("PROFILE1ACCESSKEYID"));
        assert_eq!(
            config.secret_access_key.as_deref(),
            Some("PROFILE1SECRETACCESSKEY")
        );
        assert_eq!(config.session_token.as_deref(), Some("PROFILE1SESSIONTOKEN"));
        Ok(())
    }

    #[tokio::test]
    async fn test_config_load_profile_without_files() {
        let ctx = ctx_with(&[
            (AWS_CONFIG_FILE, "/not/exist/config"),
            (AWS_SHARED_CREDENTIALS_FILE, "/not/exist/credentials"),
        ]);

        let config = Config::default().from_env(&ctx).load_profile(&ctx).await;
        assert_eq!(config.region, None);
        assert_eq!(config.access_key_id, None);
    }

    #[test]
    fn test_config_file_section() {
        assert_eq!(config_file_section("default"), "default");
        assert_eq!(config_file_section("dev"), "profile dev");
    }
}
