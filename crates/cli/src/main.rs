use clap::Parser;
use relay::{AuthScheme, Credential, Server, ServerConfig, Source};
use std::io;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "relay-server",
    about = "RTSP relay: republish upstream RTP sources to RTSP clients"
)]
struct Args {
    /// RTSP control port
    #[arg(long, short, default_value_t = 554)]
    port: u16,

    /// Source name published under /live/<name>
    #[arg(long, default_value = "cam")]
    name: String,

    /// Upstream URL to pull from
    #[arg(long, default_value = "rtsp://127.0.0.1:8554/stream")]
    url: String,

    /// Optional user:password credential protecting the source
    #[arg(long)]
    credential: Option<String>,

    /// Auth scheme when a credential is set: basic or digest
    #[arg(long, default_value = "digest")]
    auth: String,

    /// Only serve this source interleaved over TCP
    #[arg(long)]
    force_tcp: bool,

    /// Enable RTSP-over-HTTP tunnelling on this port
    #[arg(long)]
    http_port: Option<u16>,

    /// Enable RTSP-over-UDP on this port
    #[arg(long)]
    udp_port: Option<u16>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = ServerConfig {
        port: args.port,
        ..ServerConfig::default()
    };
    if let Some(port) = args.http_port {
        config = config.enable_http(port);
    }
    if let Some(port) = args.udp_port {
        config = config.enable_udp(port, false);
    }

    let mut source = Source::new(&args.name, &args.url);
    if let Some(credential) = &args.credential {
        let Some((user, pass)) = credential.split_once(':') else {
            eprintln!("--credential must be user:password");
            return;
        };
        let scheme = match args.auth.as_str() {
            "basic" => AuthScheme::Basic,
            "digest" => AuthScheme::Digest,
            other => {
                eprintln!("unknown auth scheme: {}", other);
                return;
            }
        };
        source = source.with_credential(Credential::new(user, pass), scheme);
    }
    if args.force_tcp {
        source = source.with_force_tcp();
    }

    let mut server = Server::new(config);
    if let Err(e) = server.sources().add(Arc::new(source)) {
        eprintln!("Failed to register source: {}", e);
        return;
    }

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return;
    }

    println!(
        "RTSP relay on port {} — /live/{} — press Enter to stop",
        args.port, args.name
    );
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    server.stop();
}
