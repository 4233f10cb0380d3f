use color_eyre::eyre::{
    Result,
    eyre,
};
use dicegame_client::client::{
    self,
    AppConfig,
    DEFAULT_RPC_URL,
};
use tracing_subscriber::EnvFilter;

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: dicegame-client [--rpc-url <url>] [--contract <address>]\n\
         \n\
         Flags:\n\
           --rpc-url <url>       Wallet provider endpoint (default {})\n\
           --contract <address>  DiceGame ledger address (default from {}, then built-in)",
        DEFAULT_RPC_URL,
        client::CONTRACT_ADDRESS_ENV,
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<AppConfig> {
    let mut args = std::env::args().skip(1);
    let mut rpc_url: Option<String> = None;
    let mut contract: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                if rpc_url.is_some() {
                    return Err(eyre!("--rpc-url may only be specified once"));
                }
                rpc_url = Some(url);
            }
            "--contract" => {
                let address = args
                    .next()
                    .ok_or_else(|| eyre!("--contract requires an address argument"))?;
                if contract.is_some() {
                    return Err(eyre!("--contract may only be specified once"));
                }
                contract = Some(address);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let contract = client::resolve_contract_address(contract.as_deref())?;
    let rpc_url = rpc_url.unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
    Ok(AppConfig::new(rpc_url, contract))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let config = parse_cli_args()?;
    client::run_app(config).await
}
