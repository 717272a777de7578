use pixxiden_stores::InstallProgress;
use pixxiden_sync::SyncEvent;
use serde::Serialize;

/// Library changes pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LibraryEvent {
    Sync(SyncEvent),
    InstallProgress(InstallProgress),
    #[serde(rename_all = "camelCase")]
    Installed { game_id: String },
    #[serde(rename_all = "camelCase")]
    InstallFailed { game_id: String, error: String },
    #[serde(rename_all = "camelCase")]
    Uninstalled { game_id: String },
    #[serde(rename_all = "camelCase")]
    Launched { game_id: String, pid: Option<u32> },
    #[serde(rename_all = "camelCase")]
    LaunchFailed { game_id: String, error: String },
}
