//! `run` argument compilation

use crate::build_args::sorted_pairs;
use crate::{EngineError, Result, RunIntent};

impl RunIntent {
    /// True if this is an infrastructure container that owns a network
    /// namespace instead of joining one
    pub fn is_infra_container(&self, infra_prefix: &str) -> bool {
        self.name
            .as_deref()
            .map(|name| name.starts_with(infra_prefix))
            .unwrap_or(false)
    }

    /// Compile the `run` argument list.
    ///
    /// Containers whose name starts with `infra_prefix` get no `--network`
    /// flag; every other container must name a network target.
    pub fn to_args(&self, infra_prefix: &str) -> Result<Vec<String>> {
        let mut args = vec!["run".to_string()];

        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            args.push("--name".to_string());
            args.push(name.to_string());
        }

        let mut ports: Vec<(&String, &String)> = self.ports.iter().collect();
        ports.sort();
        for (host, container) in ports {
            args.push("--publish".to_string());
            args.push(format!("{}:{}", host, container));
        }

        if !self.is_infra_container(infra_prefix) {
            let network = self
                .network
                .as_deref()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| EngineError::MissingNetwork {
                    image: self.image.clone(),
                })?;
            args.push("--network".to_string());
            args.push(format!("container:{}", network));
        }

        for pair in sorted_pairs(&self.secrets)
            .into_iter()
            .chain(sorted_pairs(&self.env_vars))
        {
            args.push("--env".to_string());
            args.push(pair);
        }

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(name: &str) -> RunIntent {
        let mut intent = RunIntent::new("123.dkr/repo:latest");
        intent.name = Some(name.to_string());
        intent.network = Some("pause-svc".to_string());
        intent
    }

    #[test]
    fn test_pause_container_skips_network() {
        let args = intent("pause-svc").to_args("pause").unwrap();
        assert!(!args.contains(&"--network".to_string()));
    }

    #[test]
    fn test_pause_container_needs_no_network_target() {
        let mut intent = intent("pause");
        intent.network = None;
        assert!(intent.to_args("pause").is_ok());
    }

    #[test]
    fn test_regular_container_joins_network() {
        let args = intent("web").to_args("pause").unwrap();
        let idx = args.iter().position(|s| s == "--network").unwrap();
        assert_eq!(args[idx + 1], "container:pause-svc");
    }

    #[test]
    fn test_regular_container_without_network_fails() {
        let mut intent = intent("web");
        intent.network = None;
        let err = intent.to_args("pause").unwrap_err();
        assert!(matches!(err, EngineError::MissingNetwork { image } if image == "123.dkr/repo:latest"));
    }

    #[test]
    fn test_unnamed_container_is_not_infra() {
        let mut intent = RunIntent::new("img");
        intent.network = Some("net".into());
        assert!(!intent.is_infra_container("pause"));
        let args = intent.to_args("pause").unwrap();
        assert_eq!(args, vec!["run", "--network", "container:net", "img"]);
    }

    #[test]
    fn test_secrets_before_env_vars() {
        let mut intent = intent("web");
        intent.env_vars.insert("A_PLAIN".into(), "1".into());
        intent.secrets.insert("Z_SECRET".into(), "s3cr3t".into());
        let args = intent.to_args("pause").unwrap();

        let secret = args.iter().position(|s| s == "Z_SECRET=s3cr3t").unwrap();
        let plain = args.iter().position(|s| s == "A_PLAIN=1").unwrap();
        assert!(secret < plain);
        assert_eq!(args[secret - 1], "--env");
        assert_eq!(args[plain - 1], "--env");
    }

    #[test]
    fn test_ports_sorted_and_command_last() {
        let mut intent = intent("web");
        intent.ports.insert("8080".into(), "80".into());
        intent.ports.insert("443".into(), "8443".into());
        intent.command = vec!["serve".into(), "--verbose".into()];
        let args = intent.to_args("pause").unwrap();

        assert_eq!(
            args,
            vec![
                "run",
                "--name",
                "web",
                "--publish",
                "443:8443",
                "--publish",
                "8080:80",
                "--network",
                "container:pause-svc",
                "123.dkr/repo:latest",
                "serve",
                "--verbose",
            ]
        );
    }
}
