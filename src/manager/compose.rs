//! Per-service configuration composition
//!
//! Each service gets a fresh property set merged from three sources, lowest
//! precedence first:
//!
//! 1. properties the container runtime recognized at startup (e.g. the
//!    server's configuration file),
//! 2. the arguments in the service's own descriptor,
//! 3. the container's command-line arguments.
//!
//! Only options addressed to the service (`--<name>.*`) are taken from the
//! first and third source. Later writes override earlier ones, so a key set
//! on the container command line beats the same key anywhere else.

use crate::manager::Failure;
use crate::properties::Properties;

/// Build the property set and residual argument list passed to a service's
/// `init`.
pub(crate) fn compose_service_config(
    name: &str,
    descriptor_args: &[String],
    recognized_options: &[String],
    container_args: &[String],
) -> Result<(Properties, Vec<String>), Failure> {
    let option_prefix = format!("--{}.", name);

    let mut service_args: Vec<String> = Vec::new();
    for option in recognized_options {
        if option.starts_with(&option_prefix) {
            service_args.push(option.clone());
        }
    }
    service_args.extend(descriptor_args.iter().cloned());
    for arg in container_args {
        if arg.starts_with(&option_prefix) {
            service_args.push(arg.clone());
        }
    }

    let mut properties = Properties::from_args(&service_args)
        .map_err(|e| Failure::new(format!("ServiceManager: {}", e)))?;
    let service_args = properties.parse_command_line_options("Ice", service_args);
    let service_args = properties.parse_command_line_options(name, service_args);

    Ok((properties, service_args))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_container_command_line_wins() {
        // Same key from all three sources; the container command line is the
        // last writer.
        let (properties, _) = compose_service_config(
            "Alpha",
            &args(&["--Alpha.mode=desc"]),
            &args(&["--Alpha.mode=server"]),
            &args(&["--Alpha.mode=cli"]),
        )
        .unwrap();
        assert_eq!(properties.get("Alpha.mode"), "cli");
    }

    #[test]
    fn test_descriptor_args_override_server_config() {
        let (properties, _) = compose_service_config(
            "Alpha",
            &args(&["--Alpha.mode=desc"]),
            &args(&["--Alpha.mode=server"]),
            &[],
        )
        .unwrap();
        assert_eq!(properties.get("Alpha.mode"), "desc");
    }

    #[test]
    fn test_only_addressed_options_are_taken() {
        let (properties, _) = compose_service_config(
            "Alpha",
            &[],
            &args(&["--Beta.mode=server", "--Alpha.mode=server"]),
            &args(&["--Beta.mode=cli"]),
        )
        .unwrap();
        assert_eq!(properties.get("Alpha.mode"), "server");
        assert_eq!(properties.get("Beta.mode"), "");
    }

    #[test]
    fn test_residual_args_keep_unmatched_tokens() {
        let (properties, residual) = compose_service_config(
            "Alpha",
            &args(&["--Alpha.mode=desc", "positional", "--Other.x=1"]),
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(properties.get("Alpha.mode"), "desc");
        assert_eq!(residual, args(&["positional", "--Other.x=1"]));
    }

    #[test]
    fn test_ice_options_consumed_before_service_options() {
        let (properties, residual) = compose_service_config(
            "Alpha",
            &args(&["--Ice.Trace.Network=2", "--Alpha.flag"]),
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(properties.get("Ice.Trace.Network"), "2");
        assert_eq!(properties.get("Alpha.flag"), "1");
        assert!(residual.is_empty());
    }
}
