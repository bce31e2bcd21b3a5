use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use vcissuer::{IssuerService, RootConfig, RootError, RootResult};
use vcissuer_issue::{ComposeCredentialRequest, IssueCredentialOptions, ProfileRequest};
use vcissuer_status::{SlotRef, StatusError};

/// vcissuer: issue, store and track verifiable credentials.
#[derive(Parser, Debug)]
#[command(name = "vcissuer", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the data directory, key material and default configuration
    Init {
        /// Data directory for the record database
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Public base URL of this issuer
        #[arg(long)]
        host_url: Option<String>,
    },

    /// Manage issuer profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Sign a complete credential under a profile
    Issue {
        #[arg(long)]
        profile: String,

        /// Credential JSON file
        #[arg(long)]
        credential: PathBuf,

        /// Issue options JSON file
        #[arg(long)]
        options: Option<PathBuf>,
    },

    /// Build a credential from a compose request and sign it
    Compose {
        #[arg(long)]
        profile: String,

        /// Compose request JSON file
        #[arg(long)]
        request: PathBuf,
    },

    /// Store a credential in a profile's vault
    Store {
        #[arg(long)]
        profile: String,

        /// Logical ID; defaults to the credential's own `id`
        #[arg(long)]
        id: Option<String>,

        /// Credential JSON file
        #[arg(long)]
        file: PathBuf,
    },

    /// Retrieve a stored credential by logical ID
    Retrieve {
        #[arg(long)]
        profile: String,

        #[arg(long)]
        id: String,
    },

    /// Credential status lists
    #[command(subcommand)]
    Status(StatusCommand),
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    /// Create a profile
    Create(CreateProfileArgs),

    /// Show a profile
    Show { name: String },
}

#[derive(Args, Debug)]
struct CreateProfileArgs {
    #[arg(long)]
    name: String,

    #[arg(long)]
    uri: String,

    #[arg(long)]
    signature_type: String,

    /// `jws` or `proofValue`
    #[arg(long)]
    signature_representation: Option<String>,

    /// Issuer DID; defaults to this deployment's did:key
    #[arg(long)]
    did: Option<String>,

    #[arg(long)]
    creator: Option<String>,

    #[arg(long)]
    disable_status: bool,

    #[arg(long)]
    overwrite_issuer: bool,
}

#[derive(Subcommand, Debug)]
enum StatusCommand {
    /// Claim the next status slot
    Allocate,

    /// Show a status list shard
    Show { shard_id: String },

    /// Set the status of a slot
    Update {
        /// Slot reference `<shard url>#<index>`, or omit and pass --profile and --credential
        slot: Option<String>,

        #[arg(long)]
        profile: Option<String>,

        /// Issued credential JSON file carrying a status reference
        #[arg(long)]
        credential: Option<PathBuf>,

        #[arg(long)]
        status: String,

        #[arg(long, default_value = "")]
        reason: String,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new(
            "vcissuer=debug,vcissuer_core=debug,vcissuer_vault=debug,vcissuer_status=debug,vcissuer_issue=debug",
        )
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vcissuer=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> RootResult<RootConfig> {
    match path {
        Some(p) => RootConfig::load(p),
        None => RootConfig::load(&RootConfig::default_config_path()),
    }
}

fn open_service(config_path: Option<&PathBuf>) -> RootResult<IssuerService> {
    IssuerService::open(load_config(config_path)?)
}

fn read_file(path: &Path) -> RootResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        RootError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> RootResult<T> {
    Ok(serde_json::from_slice(&read_file(path)?)?)
}

fn print_json<T: Serialize>(value: &T) -> RootResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        error!(kind = ?e.kind(), "{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> RootResult<()> {
    let config_path = cli.config.as_ref();
    match cli.command {
        Commands::Init { data_dir, host_url } => cmd_init(config_path, data_dir, host_url),
        Commands::Profile(cmd) => cmd_profile(config_path, cmd),
        Commands::Issue {
            profile,
            credential,
            options,
        } => {
            let service = open_service(config_path)?;
            let options: Option<IssueCredentialOptions> =
                options.as_deref().map(read_json::<IssueCredentialOptions>).transpose()?;
            let signed = service.issue(&profile, &read_file(&credential)?, options.as_ref())?;
            print_json(&signed)
        }
        Commands::Compose { profile, request } => {
            let service = open_service(config_path)?;
            let request: ComposeCredentialRequest = read_json(&request)?;
            print_json(&service.compose_and_issue(&profile, &request)?)
        }
        Commands::Store { profile, id, file } => {
            let service = open_service(config_path)?;
            let content = String::from_utf8(read_file(&file)?)
                .map_err(|e| RootError::Serialization(format!("credential is not UTF-8: {}", e)))?;
            let location = match id {
                Some(id) => service.store_credential(&content, &id, &profile)?,
                None => service.store_verifiable_credential(&profile, &content)?,
            };
            print_json(&serde_json::json!({ "location": location }))
        }
        Commands::Retrieve { profile, id } => {
            let service = open_service(config_path)?;
            let payload = service.retrieve_credential(&id, &profile)?;
            println!("{}", String::from_utf8_lossy(&payload));
            Ok(())
        }
        Commands::Status(cmd) => cmd_status(config_path, cmd),
    }
}

fn cmd_init(
    config_path: Option<&PathBuf>,
    data_dir: Option<PathBuf>,
    host_url: Option<String>,
) -> RootResult<()> {
    let mut config = load_config(config_path)?;
    if let Some(dd) = data_dir {
        config.data_dir = dd;
    }
    if let Some(url) = host_url {
        config.host_url = url;
    }

    info!("initializing vcissuer");
    let service = IssuerService::open(config.clone())?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(RootConfig::default_config_path);
    config.save(&save_path)?;

    print_json(&serde_json::json!({
        "config": save_path.display().to_string(),
        "dataDir": config.data_dir.display().to_string(),
        "keystore": config.keystore_path().display().to_string(),
        "statusBaseUrl": config.status_base_url(),
        "issuerDid": service.issuer_did(),
    }))
}

fn cmd_profile(config_path: Option<&PathBuf>, cmd: ProfileCommand) -> RootResult<()> {
    let service = open_service(config_path)?;
    match cmd {
        ProfileCommand::Create(args) => {
            let profile = service.create_profile(ProfileRequest {
                name: args.name,
                uri: args.uri,
                signature_type: args.signature_type,
                signature_representation: args.signature_representation,
                did: args.did,
                creator: args.creator,
                disable_status: args.disable_status,
                overwrite_issuer: args.overwrite_issuer,
            })?;
            print_json(&profile)
        }
        ProfileCommand::Show { name } => print_json(&service.get_profile(&name)?),
    }
}

fn cmd_status(config_path: Option<&PathBuf>, cmd: StatusCommand) -> RootResult<()> {
    let service = open_service(config_path)?;
    match cmd {
        StatusCommand::Allocate => print_json(&service.allocate_status_slot()?),
        StatusCommand::Show { shard_id } => print_json(&service.get_status_shard(&shard_id)?),
        StatusCommand::Update {
            slot,
            profile,
            credential,
            status,
            reason,
        } => {
            match (slot, profile, credential) {
                (Some(slot), None, None) => {
                    let slot: SlotRef = slot.parse().map_err(RootError::Status)?;
                    service.update_status_slot(&slot, &status, &reason)?;
                }
                (None, Some(profile), Some(credential)) => {
                    service.update_credential_status(
                        &profile,
                        &read_file(&credential)?,
                        &status,
                        &reason,
                    )?;
                }
                _ => {
                    return Err(RootError::Status(StatusError::InvalidInput(
                        "pass either a slot reference or both --profile and --credential".into(),
                    )))
                }
            }
            print_json(&serde_json::json!({ "status": status, "reason": reason }))
        }
    }
}
