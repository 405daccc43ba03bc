use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = rolo_admin::Args::parse();

	rolo_admin::run(args).await
}
