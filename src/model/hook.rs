use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of domain event a policy subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookType {
    PushImage,
    PullImage,
    DeleteImage,
    UploadChart,
    DeleteChart,
    DownloadChart,
    ScanFinished,
    ReplicateFinished,
    #[serde(rename = "p2pPreheat")]
    P2pPreheat,
    TestEndpoint,
}

impl HookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::PushImage => "pushImage",
            HookType::PullImage => "pullImage",
            HookType::DeleteImage => "deleteImage",
            HookType::UploadChart => "uploadChart",
            HookType::DeleteChart => "deleteChart",
            HookType::DownloadChart => "downloadChart",
            HookType::ScanFinished => "scanFinished",
            HookType::ReplicateFinished => "replicateFinished",
            HookType::P2pPreheat => "p2pPreheat",
            HookType::TestEndpoint => "testEndpoint",
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_display() {
        for hook in [
            HookType::PushImage,
            HookType::DeleteChart,
            HookType::P2pPreheat,
            HookType::TestEndpoint,
        ] {
            let json = serde_json::to_string(&hook).unwrap();
            assert_eq!(json, format!("\"{}\"", hook));
        }
    }

    #[test]
    fn test_preheat_wire_name() {
        let hook: HookType = serde_json::from_str("\"p2pPreheat\"").unwrap();
        assert_eq!(hook, HookType::P2pPreheat);
    }
}
