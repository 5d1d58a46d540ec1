//! GCP Projects
//!
//! Project lookup used by the health probe.

use super::client::GcpClient;
use anyhow::Result;
use serde_json::Value;

/// Project information
#[derive(Debug, Clone)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub project_number: String,
    pub lifecycle_state: String,
}

impl Project {
    pub fn is_active(&self) -> bool {
        self.lifecycle_state == "ACTIVE"
    }
}

impl From<&Value> for Project {
    fn from(value: &Value) -> Self {
        let field = |key: &str, default: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or(default)
                .to_string()
        };

        Self {
            project_id: field("projectId", "-"),
            name: field("name", "-"),
            project_number: field("projectNumber", "-"),
            lifecycle_state: field("lifecycleState", "UNKNOWN"),
        }
    }
}

/// Fetch the client's own project
pub async fn get_project(client: &GcpClient) -> Result<Project> {
    let url = client.resourcemanager_url(&format!("projects/{}", client.project_id));
    let response = client.get(&url).await?;
    Ok(Project::from(&response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_from_value() {
        let project = Project::from(&json!({
            "projectId": "my-project",
            "name": "My Project",
            "projectNumber": "1234",
            "lifecycleState": "ACTIVE"
        }));
        assert_eq!(project.project_id, "my-project");
        assert!(project.is_active());

        let partial = Project::from(&json!({ "projectId": "p" }));
        assert_eq!(partial.lifecycle_state, "UNKNOWN");
        assert!(!partial.is_active());
    }
}
