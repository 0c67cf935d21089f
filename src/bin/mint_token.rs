//! Issues signed bearer tokens for local testing of the customer API.
//!
//! ```text
//! mint-token --sub alice --role Admin --claim can_delete_user=true
//! ```

use anyhow::Context;
use chrono::Duration;
use clap::Parser;
use customer_api::{
    auth::{Claims, issue_token},
    config::{Env, JwtSettings},
};

/// Ten years. Longer lifetimes are refused at parse time.
const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Mint a JWT accepted by the customer API.
///
/// Signing parameters come from JWT_SECRET, JWT_ISSUER and JWT_AUDIENCE,
/// with the same local fallbacks as the server.
#[derive(Parser, Debug)]
#[command(name = "mint-token", version, about)]
struct Cli {
    /// Subject of the token.
    #[arg(long, default_value = "developer")]
    sub: String,

    /// Role to grant; repeatable.
    #[arg(long = "role")]
    roles: Vec<String>,

    /// Extra claim as name=value; repeatable.
    #[arg(long = "claim", value_parser = parse_claim)]
    claims: Vec<(String, String)>,

    /// Lifetime in seconds, at most ten years.
    #[arg(long, default_value_t = 3600, value_parser = clap::value_parser!(i64).range(1..=MAX_TTL_SECS))]
    ttl_secs: i64,
}

fn parse_claim(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got `{raw}`")),
    }
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let settings = JwtSettings::from_env(Env::from_env()).context("invalid JWT settings")?;

    let mut claims = Claims::new(cli.sub, Duration::seconds(cli.ttl_secs));
    for role in cli.roles {
        claims = claims.with_role(role);
    }
    for (name, value) in cli.claims {
        claims = claims.with_claim(name, value);
    }

    let token = issue_token(&settings, claims).context("failed to sign token")?;
    println!("{token}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_must_be_positive_and_bounded() {
        for ttl in ["0", "-5", "9223372036854775807"] {
            assert!(
                Cli::try_parse_from(["mint-token", "--ttl-secs", ttl]).is_err(),
                "{ttl} accepted"
            );
        }

        let cli = Cli::try_parse_from(["mint-token", "--ttl-secs", "86400"]).unwrap();
        assert_eq!(cli.ttl_secs, 86400);
        assert_eq!(Cli::try_parse_from(["mint-token"]).unwrap().ttl_secs, 3600);
    }

    #[test]
    fn claims_are_split_on_the_first_equals_sign() {
        let cli = Cli::try_parse_from([
            "mint-token",
            "--role",
            "Admin",
            "--claim",
            "can_delete_user=true",
            "--claim",
            "note=a=b",
        ])
        .unwrap();

        assert_eq!(cli.roles, ["Admin"]);
        assert_eq!(
            cli.claims,
            [
                ("can_delete_user".to_string(), "true".to_string()),
                ("note".to_string(), "a=b".to_string()),
            ]
        );
        assert!(parse_claim("=orphan").is_err());
        assert!(parse_claim("no-separator").is_err());
    }
}
