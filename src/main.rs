use wakeonlan::api::Api;

use clap::Parser;
use log::info;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    http_addr: String,

    /// File used to persist the device list.
    #[arg(long, env = "CACHE_FILE", default_value = "devices.json")]
    cache_file: PathBuf,

    /// Directory of static files to serve under /static/.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Source IP used as the local address when broadcasting, to pick the
    /// outgoing interface.
    #[arg(long, env = "SOURCE_IP")]
    source_ip: Option<IpAddr>,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("INFO"))
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Millis))
        .init();

    let api = Api::new(args.cache_file)
        .with_source_ip(args.source_ip)
        .with_static_dir(args.static_dir);

    info!("Starting server on {}...", args.http_addr);
    rouille::start_server(args.http_addr, move |request| api.handle(request));
}
