//! `control` subcommand: spawn a Control Sender REPL (grounded in
//! `control.py`'s `ControlSender`).

use crate::control::ControlSender;
use clap::Args;

#[derive(Args, Debug)]
pub struct ControlArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long, default_value = "control")]
    pub content_type: String,

    #[arg(long)]
    pub source_id: Option<String>,

    #[arg(long, default_value_t = 0.2)]
    pub latency: f64,

    #[arg(long)]
    pub debug: bool,
}

pub async fn run(args: ControlArgs) -> anyhow::Result<()> {
    let source_id = args.source_id.clone().unwrap_or_else(|| format!("{}-control", args.name));
    let sender = ControlSender::new(&args.name, &args.content_type, &source_id, args.latency)?;
    sender.run_repl().await?;
    Ok(())
}
