//! One-time setup wizard.
//!
//! Exchanges the user's Group ID and OAuth token for temporary storage
//! credentials, writes them into a dedicated AWS CLI profile, proves the
//! profile can reach the group's bucket prefix and finally persists the
//! platform config for later uploads.

use crate::config::{ConfigError, ConnectorSettings, GroupId, OAuthToken, PlatformConfig};
use crate::config::{PACKAGE_NAME, PRODUCT_NAME};
use crate::contract::{
    ApiError, ObjectStorage, PlatformApi, ProfileSettings, Prompter, StorageError, UserProfile,
};
use crate::storage::{check_s3_access, RetryPolicy};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

pub const AWS_CLI_INSTALL_URL: &str =
    "https://docs.aws.amazon.com/cli/latest/userguide/getting-started-install.html";

const RULE: &str = "--------------------------------------------------";

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(
        "AWS CLI was not detected on your system. Please install it and run the setup program again. \
         For install instructions go to: https://docs.aws.amazon.com/cli/latest/userguide/getting-started-install.html"
    )]
    StorageCliMissing,
    #[error("failed to read input: {0}")]
    Prompt(#[source] std::io::Error),
    #[error("{0}")]
    InvalidInput(#[source] ConfigError),
    #[error("ModelCat API error: {0}")]
    Api(#[from] ApiError),
    #[error("AWS configuration failure: {0}")]
    Storage(#[from] StorageError),
    #[error("AWS profile `{0}` is still not usable after configuration")]
    ProfileCheckFailed(String),
    #[error("Verification failed... Please check your credentials or contact customer support. ({0})")]
    AccessDenied(#[source] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Values supplied up front (e.g. from command-line flags); they are
/// validated but never prompted for.
#[derive(Debug, Clone, Default)]
pub struct SetupInputs {
    pub group_id: Option<String>,
    pub oauth_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SetupReport {
    pub group_id: GroupId,
    pub user: UserProfile,
    pub config_path: PathBuf,
    /// Expiry of the temporary storage credentials, as reported by the platform.
    pub credentials_expire: String,
}

pub struct SetupWizard<'a, S: ?Sized, P: ?Sized> {
    pub settings: &'a ConnectorSettings,
    pub storage: &'a S,
    pub prompter: &'a P,
    pub s3_retry: RetryPolicy,
    pub inputs: SetupInputs,
}

impl<'a, S, P> SetupWizard<'a, S, P>
where
    S: ObjectStorage + ?Sized,
    P: Prompter + ?Sized,
{
    pub fn new(settings: &'a ConnectorSettings, storage: &'a S, prompter: &'a P) -> Self {
        Self {
            settings,
            storage,
            prompter,
            s3_retry: RetryPolicy::default(),
            inputs: SetupInputs::default(),
        }
    }

    /// Run the wizard. `connect` builds the API client once the token is known.
    pub async fn run<A, F>(&self, connect: F) -> Result<SetupReport, SetupError>
    where
        A: PlatformApi,
        F: FnOnce(&OAuthToken) -> Result<A, ApiError>,
    {
        println!("Welcome to {PACKAGE_NAME} one-time setup wizard.");
        println!("We'll get you started in just a few simple steps!");
        println!("{RULE}");

        match self.storage.is_installed().await {
            Some(version) => {
                info!(%version, "AWS CLI found");
                println!("AWS CLI installation verified.");
                println!("{RULE}");
            }
            None => {
                error!(url = AWS_CLI_INSTALL_URL, "AWS CLI not installed");
                return Err(SetupError::StorageCliMissing);
            }
        }

        let group_id = self.group_id()?;
        let token = self.oauth_token()?;

        let api = connect(&token)?;
        let user = api.get_me().await?;
        println!("Hello, {}!", user.full_name);
        info!(email = %user.email, %group_id, "Authenticated with platform");

        let credentials = api.get_storage_credentials(&group_id.to_string()).await?;
        info!(expires = %credentials.expiration_date, "Received storage credentials");

        let profile = ProfileSettings {
            profile: self.settings.aws_profile.clone(),
            region: self.settings.aws_region.clone(),
            output_format: self.settings.aws_output_format.clone(),
        };
        self.storage.configure_profile(&profile, &credentials).await?;
        if !self.storage.check_profile(&profile.profile).await {
            return Err(SetupError::ProfileCheckFailed(profile.profile));
        }

        println!("{RULE}");
        println!("Verifying AWS access...");
        check_s3_access(
            self.storage,
            &self.settings.account_uri(&group_id),
            &profile.profile,
            self.s3_retry,
        )
        .await
        .map_err(SetupError::AccessDenied)?;
        println!("Verification successful.");

        let config_dir = self.settings.config_dir()?;
        let config_path = PlatformConfig::new(&group_id, &token).save(&config_dir)?;

        println!("{RULE}");
        println!("Configuration complete.");
        println!();
        println!("Now you can use:");
        println!(
            "\t`modelcat_validate` to check your dataset for errors and verify {PRODUCT_NAME} interoperability"
        );
        println!("\t`modelcat_upload` to upload dataset to {PRODUCT_NAME} platform");

        Ok(SetupReport {
            group_id,
            user,
            config_path,
            credentials_expire: credentials.expiration_date,
        })
    }

    fn group_id(&self) -> Result<GroupId, SetupError> {
        if let Some(raw) = &self.inputs.group_id {
            return raw.parse().map_err(SetupError::InvalidInput);
        }
        loop {
            let raw = self
                .prompter
                .ask(&format!("{PRODUCT_NAME} Group ID: "))
                .map_err(SetupError::Prompt)?;
            match raw.parse::<GroupId>() {
                Ok(id) => return Ok(id),
                Err(_) => {
                    warn!("Rejected malformed group id");
                    println!(
                        "Oops... This does not look right. `{PRODUCT_NAME} Group ID` should be a valid UUID in XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX format"
                    );
                }
            }
        }
    }

    fn oauth_token(&self) -> Result<OAuthToken, SetupError> {
        if let Some(raw) = &self.inputs.oauth_token {
            return raw.parse().map_err(SetupError::InvalidInput);
        }
        loop {
            let raw = self
                .prompter
                .ask_secret(&format!("{PRODUCT_NAME} OAuth Token: "))
                .map_err(SetupError::Prompt)?;
            match raw.parse::<OAuthToken>() {
                Ok(token) => return Ok(token),
                Err(_) => {
                    warn!("Rejected malformed OAuth token");
                    println!(
                        "Oops... This does not look right. `{PRODUCT_NAME} OAuth Token` should be an integer followed by an underscore, followed by a 40 character string e.g.: 1_1234567890abcdef1234567890abcdef12345678"
                    );
                }
            }
        }
    }
}
