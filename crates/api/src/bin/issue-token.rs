//! Development token utility for SupportChat
//!
//! Mints an HS256 access token with the same secret the server verifies, so a
//! local chat can be exercised without the external auth service.
//!
//! Usage:
//!   cargo run --bin issue-token -- <user-id> [ADMIN|CLIENT] [name] [email]
//!
//! The secret is read from `JWT_SECRET` (a `.env` file is honoured).

use std::env;
use supportchat_api::auth::JwtManager;
use supportchat_shared::Role;
use time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let mut args = env::args().skip(1);
    let Some(user_id) = args.next() else {
        eprintln!("Usage: issue-token <user-id> [ADMIN|CLIENT] [name] [email]");
        std::process::exit(1);
    };
    let user_id: i64 = user_id
        .parse()
        .map_err(|_| format!("User id must be numeric, got {:?}", user_id))?;
    let role = Role::from_claim(&args.next().unwrap_or_default());
    let name = args.next();
    let email = args.next();

    let secret = env::var("JWT_SECRET").map_err(|_| "JWT_SECRET is not set")?;
    if secret.len() < 32 {
        eprintln!("Warning: JWT_SECRET is shorter than 32 characters; the server will refuse it.");
    }

    let token = JwtManager::new(&secret).generate_token(
        user_id,
        role,
        name.as_deref(),
        email.as_deref(),
        Duration::days(1),
    )?;

    println!("{}", token);
    Ok(())
}
