use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = pandu_api::Args::parse();

	pandu_api::run(args).await
}
