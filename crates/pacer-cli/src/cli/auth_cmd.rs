use super::shared::{build_source, load_config};
use super::*;
use pacer_core::source::ActivitySource;
use pacer_providers::auth::{OAuthToken, delete_token, get_token, set_token};

pub(super) async fn handle_auth(args: AuthArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let account = config.account_name().to_string();
    match args.command {
        AuthCommands::SetToken(args) => {
            let token = OAuthToken {
                access_token: args.access_token,
                refresh_token: args.refresh_token,
                expires_at: args.expires_at,
                token_endpoint: Some(args.token_endpoint),
                client_id: args.client_id,
                client_secret: args.client_secret,
            };
            set_token(&account, &token)?;
            println!("Token stored for account {account}.");
        }
        AuthCommands::Status => {
            let token = get_token(&account)
                .with_context(|| format!("no token stored for account {account}; run auth set-token"))?;
            match token.expires_at {
                Some(expires_at) => println!("Access token expires at {expires_at} (unix seconds)."),
                None => println!("Access token has no recorded expiry."),
            }
            let source = build_source(&config);
            match source.validate_auth().await {
                Ok(()) => println!("Token accepted by {}.", source.name()),
                Err(err) => anyhow::bail!("{} rejected the token: {err}", source.name()),
            }
        }
        AuthCommands::Clear => {
            delete_token(&account)?;
            println!("Token removed for account {account}.");
        }
    }
    Ok(())
}
