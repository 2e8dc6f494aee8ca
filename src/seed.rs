//! One-time startup seed: creates the initial super-user when the users
//! table has none and credentials are configured.

use diesel::prelude::*;
use tracing::{info, warn};

use crate::auth::password::PasswordService;
use crate::config::Config;
use crate::models::{NewUser, User};
use crate::schema::users;
use crate::DbPool;

pub fn run(pool: &DbPool, config: &Config) -> Result<(), String> {
    let mut conn = pool
        .get()
        .map_err(|e| format!("Seed could not get a connection: {}", e))?;

    let super_users: i64 = users::table
        .filter(users::is_super.eq(true))
        .count()
        .get_result(&mut conn)
        .map_err(|e| format!("Seed count query failed: {}", e))?;

    if super_users > 0 {
        return Ok(());
    }

    let (Some(email), Some(password)) = (
        config.seed.admin_email.as_ref(),
        config.seed.admin_password.as_ref(),
    ) else {
        warn!("No super-user exists and SEED_ADMIN_EMAIL/SEED_ADMIN_PASSWORD are not set");
        return Ok(());
    };

    let password_hash =
        PasswordService::hash_password_with_cost(password, config.security.password_hash_cost)
            .map_err(|e| format!("Seed password hashing failed: {}", e))?;

    let user: User = diesel::insert_into(users::table)
        .values(&NewUser {
            email: email.to_lowercase(),
            password_hash: Some(password_hash),
            full_name: None,
            permission_level: "admin".to_string(),
            is_super: true,
            status: "active".to_string(),
        })
        .get_result(&mut conn)
        .map_err(|e| format!("Seed insert failed: {}", e))?;

    info!(user_id = %user.id, email = %user.email, "Seeded initial super-user");

    Ok(())
}
