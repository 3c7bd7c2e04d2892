use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "carver",
    about = "GPU partitioning operator: tracks node and pod state and carves GPUs into MIG profiles to satisfy pending demand"
)]
pub struct Cli {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "GPU_CARVER_GPU_INFO_PATH",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to a YAML file extending the built-in MIG capability table, e.g. /etc/gpu-carver/gpu-info.yaml"
    )]
    pub gpu_info_path: Option<PathBuf>,

    #[arg(
        long,
        env = "GPU_CARVER_PARTITIONING_INTERVAL",
        default_value = "10",
        help = "Seconds between partitioning cycles"
    )]
    pub partitioning_interval_secs: u64,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_apply_without_arguments() {
        let cli = Cli::try_parse_from(["carver"]).unwrap();
        assert_eq!(cli.partitioning_interval_secs, 10);
        assert!(cli.gpu_info_path.is_none());
    }
}
