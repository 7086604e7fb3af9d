use clap::{Parser, Subcommand};
use primitive_types::U256;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use twins_chain_core::blockchain::{BlockHeader, ChainState};
use twins_chain_core::config::NodeConfig;
use twins_chain_core::encoding::Decodable;
use twins_chain_core::storage::{BlockIndexStore, SqliteBlockStorage};
use twins_chain_core::util::{hash_from_hex, hash_to_hex};

#[derive(Parser, Debug)]
#[command(name = "twins_chain_core")]
#[command(about = "Header-chain index and fork choice for TWINS")]
struct Cli {
    /// Settings file; defaults to an optional twins_chain.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Print the active tip as JSON
    Status,
    /// Accept headers from a file of hex lines, each optionally followed by a decimal stake
    Import { file: PathBuf },
    /// Print the block locator from the tip or from the given block
    Locator { hash: Option<String> },
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = NodeConfig::load(cli.config.as_deref())?;
    let params = config.chain_params();
    log::info!("TWINS chain core starting on {} with index at {}", params.network_id_string, config.db_path);

    let storage: Arc<dyn BlockIndexStore> = Arc::new(SqliteBlockStorage::new(&config.db_path)?);
    let chain_state = ChainState::new(params, storage)?;

    match cli.command.unwrap_or(Command::Status) {
        Command::Status => print_status(&chain_state),
        Command::Import { file } => {
            import_headers(&chain_state, &file)?;
            print_status(&chain_state)
        }
        Command::Locator { hash } => {
            let from = hash.as_deref().map(hash_from_hex).transpose()?;
            let locator = chain_state.locator(from.as_ref())?;
            let hashes: Vec<String> = locator.hashes.iter().map(hash_to_hex).collect();
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "locator": hashes }))?);
            Ok(())
        }
    }
}

fn print_status(chain_state: &ChainState) -> Result<(), Box<dyn Error>> {
    let tip = chain_state.tip().ok_or("active chain is empty")?;
    let status = serde_json::json!({
        "network": chain_state.params().network_id_string,
        "height": tip.height,
        "tip": hash_to_hex(&tip.hash),
        "work": format!("{:#x}", tip.power.work),
        "stake": format!("{:#x}", tip.power.stake),
        "headers": chain_state.block_count(),
        "target_spacing": chain_state.params().pow_target_spacing,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Each non-empty line holds a hex-encoded header, optionally followed by the
/// block's stake as a decimal amount.
fn import_headers(chain_state: &ChainState, path: &Path) -> Result<(), Box<dyn Error>> {
    let contents = std::fs::read_to_string(path)?;
    let (mut accepted, mut known, mut reorgs) = (0usize, 0usize, 0usize);

    for (line_no, line) in contents.lines().enumerate() {
        let mut fields = line.split_whitespace();
        let Some(header_hex) = fields.next() else {
            continue;
        };
        let stake = match fields.next() {
            Some(amount) => U256::from_dec_str(amount).map_err(|e| format!("line {}: bad stake: {:?}", line_no + 1, e))?,
            None => U256::zero(),
        };
        let header = BlockHeader::from_bytes(&hex::decode(header_hex)?)
            .map_err(|e| format!("line {}: bad header: {}", line_no + 1, e))?;

        let outcome = chain_state.accept_header(&header, stake)?;
        if outcome.already_known {
            known += 1;
        } else {
            accepted += 1;
        }
        if outcome.reorg.is_some() {
            reorgs += 1;
        }
    }

    log::info!("Imported {} headers ({} already known, {} reorganizations)", accepted, known, reorgs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use twins_chain_core::chainparams::REGTEST_PARAMS;
    use twins_chain_core::encoding::Encodable;

    #[test]
    fn status_is_the_default_command() {
        let cli = Cli::try_parse_from(["twins_chain_core"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.config, None);
        let cli = Cli::try_parse_from(["twins_chain_core", "--config", "node.toml", "status"]).unwrap();
        assert_eq!(cli.command, Some(Command::Status));
        assert_eq!(cli.config, Some(PathBuf::from("node.toml")));
    }

    #[test]
    fn subcommand_arguments_are_parsed() {
        let cli = Cli::try_parse_from(["twins_chain_core", "import", "headers.txt"]).unwrap();
        assert_eq!(cli.command, Some(Command::Import { file: PathBuf::from("headers.txt") }));
        let cli = Cli::try_parse_from(["twins_chain_core", "locator"]).unwrap();
        assert_eq!(cli.command, Some(Command::Locator { hash: None }));
        let cli = Cli::try_parse_from(["twins_chain_core", "locator", "00ab"]).unwrap();
        assert_eq!(cli.command, Some(Command::Locator { hash: Some("00ab".to_string()) }));
    }

    #[test]
    fn malformed_invocations_are_rejected() {
        assert!(Cli::try_parse_from(["twins_chain_core", "import"]).is_err());
        assert!(Cli::try_parse_from(["twins_chain_core", "rewind"]).is_err());
        assert!(Cli::try_parse_from(["twins_chain_core", "locator", "a", "b"]).is_err());
    }

    #[test]
    fn import_skips_blank_lines_and_counts_known_headers() {
        let storage: Arc<dyn BlockIndexStore> = Arc::new(SqliteBlockStorage::in_memory().unwrap());
        let chain_state = ChainState::new(&REGTEST_PARAMS, storage).unwrap();
        let genesis = hex::encode(REGTEST_PARAMS.genesis_header().to_bytes());
        let path = std::env::temp_dir().join(format!("twins_chain_import_{}.txt", std::process::id()));
        std::fs::write(&path, format!("{}\n\n{} 0\n", genesis, genesis)).unwrap();
        let imported = import_headers(&chain_state, &path);
        std::fs::remove_file(&path).unwrap();
        imported.unwrap();
        assert_eq!(chain_state.block_count(), 1);
    }

    #[test]
    fn import_reports_the_bad_line() {
        let storage: Arc<dyn BlockIndexStore> = Arc::new(SqliteBlockStorage::in_memory().unwrap());
        let chain_state = ChainState::new(&REGTEST_PARAMS, storage).unwrap();
        let path = std::env::temp_dir().join(format!("twins_chain_bad_import_{}.txt", std::process::id()));
        std::fs::write(&path, "00ff\n").unwrap();
        let imported = import_headers(&chain_state, &path);
        std::fs::remove_file(&path).unwrap();
        let message = imported.unwrap_err().to_string();
        assert!(message.starts_with("line 1: bad header"), "{}", message);
    }
}
