//! CLI parsing and configuration tests.
//!
//! The CLI is a binary crate, so these tests exercise equivalent clap
//! structs and the configuration types it loads.

// ============================================================================
// Configuration loading
// ============================================================================

mod config_loading {
    use std::io::Write;
    use std::time::Duration;

    use qflow_nodes::FlowConfig;
    use qflow_shell::ShellConfig;
    use serde::Deserialize;

    /// Equivalent to commands::common::QflowConfig
    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct QflowConfig {
        shell: ShellConfig,
        flow: FlowConfig,
    }

    fn load(source: &str) -> anyhow::Result<QflowConfig> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(source.as_bytes())?;
        let text = std::fs::read_to_string(file.path())?;
        Ok(serde_yaml_ng::from_str(&text)?)
    }

    #[test]
    fn test_full_config() {
        let config = load(
            "shell:\n  interpreter: /opt/venv/bin/python\n  args: [\"-u\", \"-i\", \"-q\"]\n  execute_timeout_ms: 5000\nflow:\n  circuit_ready_timeout_ms: 1000\n",
        )
        .unwrap();
        assert_eq!(
            config.shell.interpreter,
            std::path::PathBuf::from("/opt/venv/bin/python")
        );
        assert_eq!(config.shell.args.len(), 3);
        assert_eq!(config.shell.execute_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.flow.circuit_ready_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = load("shell:\n  execute_timeout_ms: null\n").unwrap();
        assert_eq!(config.shell.interpreter, ShellConfig::default().interpreter);
        assert_eq!(config.shell.execute_timeout(), None);
        assert_eq!(config.flow, FlowConfig::default());
    }

    #[test]
    fn test_empty_config() {
        let config = load("{}").unwrap();
        assert_eq!(config.shell, ShellConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        assert!(load("shell:\n  execute_timeout_ms: soon\n").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let config = load("shell:\n  interpreter: python3\n").unwrap();
        let shell = config.shell.apply_env_from(|key| match key {
            qflow_shell::config::ENV_INTERPRETER => Some("/usr/bin/python3.12".into()),
            _ => None,
        });
        assert_eq!(
            shell.interpreter,
            std::path::PathBuf::from("/usr/bin/python3.12")
        );
    }
}

// ============================================================================
// Clap argument parsing (test via try_parse_from on equivalent structs)
// ============================================================================

mod clap_parsing {
    use clap::{Parser, Subcommand};

    #[derive(Parser)]
    #[command(name = "qflow")]
    struct TestCli {
        #[arg(short, long, action = clap::ArgAction::Count, global = true)]
        verbose: u8,

        #[arg(short, long, global = true)]
        config: Option<String>,

        #[command(subcommand)]
        command: TestCommands,
    }

    #[derive(Subcommand)]
    enum TestCommands {
        Exec {
            #[arg(short, long, conflicts_with = "code", required_unless_present = "code")]
            file: Option<String>,
            #[arg(long)]
            code: Option<String>,
        },
        Check,
        Bell {
            #[arg(short, long, default_value = "1024")]
            shots: u32,
        },
    }

    #[test]
    fn test_exec_file() {
        let cli = TestCli::try_parse_from(["qflow", "exec", "-f", "script.py"]).unwrap();
        match cli.command {
            TestCommands::Exec { file, code } => {
                assert_eq!(file.as_deref(), Some("script.py"));
                assert!(code.is_none());
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_exec_code() {
        let cli = TestCli::try_parse_from(["qflow", "exec", "--code", "print(1)"]).unwrap();
        assert!(matches!(
            cli.command,
            TestCommands::Exec { file: None, code: Some(ref c) } if c == "print(1)"
        ));
    }

    #[test]
    fn test_exec_requires_source() {
        assert!(TestCli::try_parse_from(["qflow", "exec"]).is_err());
        assert!(
            TestCli::try_parse_from(["qflow", "exec", "-f", "a.py", "--code", "x"]).is_err()
        );
    }

    #[test]
    fn test_bell_defaults() {
        let cli = TestCli::try_parse_from(["qflow", "bell"]).unwrap();
        assert!(matches!(cli.command, TestCommands::Bell { shots: 1024 }));

        let cli = TestCli::try_parse_from(["qflow", "bell", "-s", "10"]).unwrap();
        assert!(matches!(cli.command, TestCommands::Bell { shots: 10 }));
    }

    #[test]
    fn test_global_flags() {
        let cli =
            TestCli::try_parse_from(["qflow", "check", "-vv", "--config", "qflow.yaml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref(), Some("qflow.yaml"));
        assert!(matches!(cli.command, TestCommands::Check));
    }

    #[test]
    fn test_no_subcommand() {
        assert!(TestCli::try_parse_from(["qflow"]).is_err());
    }
}
