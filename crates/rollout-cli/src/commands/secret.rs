use rollout_cloud::{AwsClient, SecretWrite};
use rollout_core::RolloutConfig;
use secrecy::{ExposeSecret, SecretString};
use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;

/// Store `{"username", "password"}` under `secret_id`, reading the password
/// from stdin so it never appears in shell history or argv.
pub async fn secret_set(secret_id: &str, username: &str) -> anyhow::Result<()> {
    let config = RolloutConfig::load(Path::new("."))?;

    let password = read_password()?;
    if password.expose_secret().is_empty() {
        anyhow::bail!("empty password, nothing stored");
    }
    let value = secret_document(username, &password);

    let client = AwsClient::new(config.app.region.clone());
    match client.set_secret(secret_id, &value).await? {
        SecretWrite::Created => println!("Secret '{secret_id}' created"),
        SecretWrite::Updated => println!("Secret '{secret_id}' updated"),
    }
    Ok(())
}

/// The JSON document whose fields the build references as `<secret_id>:username`
/// and `<secret_id>:password`.
fn secret_document(username: &str, password: &SecretString) -> SecretString {
    SecretString::from(
        serde_json::json!({
            "username": username,
            "password": password.expose_secret(),
        })
        .to_string(),
    )
}

fn read_password() -> anyhow::Result<SecretString> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        print!("Password: ");
        std::io::stdout().flush()?;
    }

    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\r', '\n']).to_owned();
    Ok(SecretString::from(trimmed))
}
