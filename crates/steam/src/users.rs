use serde::{Deserialize, Serialize};

use crate::SteamError;
use crate::paths::Paths;
use crate::vdf::load_vdf;

/// An account that has logged into the local Steam client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    pub steam_id: String,
    pub account_name: String,
    pub persona_name: Option<String>,
    pub most_recent: bool,
}

/// Reads config/loginusers.vdf.
///
/// A missing file means nobody has logged in and yields an empty list.
pub fn login_users(paths: &Paths) -> Result<Vec<LoginUser>, SteamError> {
    let path = paths.login_users_path();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let root = load_vdf(&path)?;
    let Some(users) = root.get("users") else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for (steam_id, entry) in users.entries() {
        // Entries without an account name are stale placeholders.
        let Some(account_name) = entry.get_str("AccountName").filter(|n| !n.is_empty()) else {
            continue;
        };
        out.push(LoginUser {
            steam_id: steam_id.to_string(),
            account_name: account_name.to_string(),
            persona_name: entry.get_str("PersonaName").map(str::to_string),
            most_recent: entry.get_str("MostRecent") == Some("1"),
        });
    }
    Ok(out)
}

/// Returns the most recent account, or the first one.
pub fn active_account(paths: &Paths) -> Result<Option<LoginUser>, SteamError> {
    let users = login_users(paths)?;
    if let Some(u) = users.iter().find(|u| u.most_recent) {
        return Ok(Some(u.clone()));
    }
    Ok(users.into_iter().next())
}
