//! Prints fresh secrets and the admin password hash as `.env` lines.

use clap::Parser;
use rand::{rngs::OsRng, RngCore};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use repair_desk::auth::password::hash_password;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Parser)]
#[command(about = "Generate secrets and the admin credential for repair-desk")]
struct Args {
    /// Admin password to hash
    #[arg(long, env = "ADMIN_PASSWORD")]
    password: String,

    /// Admin login name
    #[arg(long, default_value = "admin")]
    username: String,
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.password.chars().count() < MIN_PASSWORD_LEN {
        anyhow::bail!("admin password must be at least {MIN_PASSWORD_LEN} characters");
    }

    let hash = hash_password(&args.password)?;
    let generated = OffsetDateTime::now_utc().format(&Rfc3339)?;

    println!("# generated {generated}; keep this file private");
    println!("JWT_SECRET={}", random_hex(64));
    println!("ENCRYPTION_KEY={}", random_hex(32));
    println!("ADMIN_USERNAME={}", args.username);
    // Single quotes keep dotenv from expanding the `$` separators.
    println!("ADMIN_PASSWORD_HASH='{hash}'");
    Ok(())
}
