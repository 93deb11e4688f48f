//! Terminal rendering of deployment progress.

use shipyard_config::OutputConfig;
use shipyard_core::{ActivityType, PlatformContext, ServiceInfoList};
use shipyard_watch::WatchEvent;

/// Prints progress to stdout.
pub struct Renderer {
    output: OutputConfig,
}

impl Renderer {
    pub fn new(output: OutputConfig) -> Self {
        Self { output }
    }

    /// Print a progress line unless output is quiet.
    pub fn progress(&self, line: &str) {
        if !self.output.quiet {
            println!("{}", line);
        }
    }

    pub fn event(&self, event: &WatchEvent) {
        if self.output.quiet {
            return;
        }
        println!("{}", format_event(event));
    }

    /// Print the success summary with each service's public URL.
    pub fn deployed(&self, context: &PlatformContext, project_id: &str, services: &ServiceInfoList) {
        for line in success_lines(context, project_id, services) {
            println!("{}", line);
        }
    }
}

pub fn format_event(event: &WatchEvent) -> String {
    match event {
        WatchEvent::Header(header) => format!("--- {} ---", header),
        WatchEvent::ServiceChanged {
            service_id,
            state,
            message,
            failed,
        } => {
            let marker = match state {
                _ if *failed => "✗",
                ActivityType::BuildSucceeded | ActivityType::DeploySucceeded => "✓",
                _ => "▶",
            };
            format!("{} {}: {}", marker, service_id, message)
        }
    }
}

pub fn success_lines(
    context: &PlatformContext,
    project_id: &str,
    services: &ServiceInfoList,
) -> Vec<String> {
    let mut lines = vec![format!("✓ Deployed {}", project_id)];
    for service in services.iter() {
        lines.push(format!(
            "  {} - {}",
            service.service_id,
            context.service_url(&service.service_id, project_id)
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::{AccessToken, ServiceInfo};

    #[test]
    fn test_format_events() {
        assert_eq!(
            format_event(&WatchEvent::Header("Deploying shop".to_string())),
            "--- Deploying shop ---"
        );
        let event = WatchEvent::ServiceChanged {
            service_id: "web".to_string(),
            state: ActivityType::BuildFailed,
            message: "Build failed".to_string(),
            failed: true,
        };
        assert_eq!(format_event(&event), "✗ web: Build failed");

        let event = WatchEvent::ServiceChanged {
            service_id: "api".to_string(),
            state: ActivityType::DeploySucceeded,
            message: "Deployed".to_string(),
            failed: false,
        };
        assert_eq!(format_event(&event), "✓ api: Deployed");
    }

    #[test]
    fn test_success_lines_list_urls() {
        let context = PlatformContext {
            remote: "cloud".to_string(),
            infrastructure: "shipyard.cloud".to_string(),
            username: "dev".to_string(),
            token: AccessToken::new("t"),
            skip_tls_verify: false,
        };
        let services = ServiceInfoList::new(vec![
            ServiceInfo::new("web", "/p/web"),
            ServiceInfo::new("api", "/p/api"),
        ]);

        assert_eq!(
            success_lines(&context, "shop", &services),
            vec![
                "✓ Deployed shop",
                "  api - https://api-shop.shipyard.cloud",
                "  web - https://web-shop.shipyard.cloud",
            ]
        );
    }
}
