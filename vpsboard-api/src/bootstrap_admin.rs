use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use vpsboard_common::{Error, Principal, Role};
use vpsboard_core::Store;

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn read_secret_file(path: &str) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn default_admin_password() -> Option<String> {
    if let Ok(v) = std::env::var("DEFAULT_ADMIN_PASSWORD") {
        let v = v.trim().to_string();
        if !v.is_empty() {
            return Some(v);
        }
    }
    let file = env_string(
        "DEFAULT_ADMIN_PASSWORD_FILE",
        "/run/secrets/default_admin_password",
    );
    read_secret_file(&file)
}

pub async fn ensure_default_admin(store: &Arc<dyn Store>) {
    // Allow disabling in special cases, but default is enabled.
    if !env_bool("BOOTSTRAP_DEFAULT_ADMIN", true) {
        return;
    }

    let username = env_string("DEFAULT_ADMIN_USERNAME", "admin").to_ascii_lowercase();
    let email = env_string("DEFAULT_ADMIN_EMAIL", "admin@vpsboard.local").to_ascii_lowercase();

    let Some(password) = default_admin_password() else {
        eprintln!(
            "[warn] BOOTSTRAP_DEFAULT_ADMIN enabled but no DEFAULT_ADMIN_PASSWORD (or readable DEFAULT_ADMIN_PASSWORD_FILE); skipping admin creation"
        );
        return;
    };

    match store.identity_taken(&username, &email, None).await {
        Ok(true) => return,
        Ok(false) => {}
        Err(e) => {
            eprintln!("[warn] default admin lookup failed: {}", e);
            return;
        }
    }

    let password_hash = match bcrypt::hash(&password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(e) => {
            eprintln!("[warn] default admin password hashing failed: {}", e);
            return;
        }
    };

    let now = Utc::now();
    let admin = Principal {
        id: Uuid::new_v4(),
        username: username.clone(),
        email,
        password_hash,
        role: Role::Admin,
        created_at: now,
        updated_at: now,
    };

    // If another replica races, the unique index makes the duplicate lose cleanly.
    match store.insert_principal(&admin).await {
        Ok(()) => eprintln!("[info] Created default admin user '{}'", username),
        Err(Error::DuplicateIdentity(_)) => {}
        Err(e) => eprintln!("[warn] default admin creation failed: {}", e),
    }
}
