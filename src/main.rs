use tokio::sync::mpsc;
use tracing::{error, info};
use vhostd::admin;
use vhostd::config::{Config, ConfigError};
use vhostd::server::Server;

// Fatal-error exit codes, one per failure category.
const EXIT_USAGE: i32 = 1;
const EXIT_CONFIG_MISSING: i32 = 2;
const EXIT_CONFIG_UNREADABLE: i32 = 3;
const EXIT_CONFIG_BAD_VALUES: i32 = 4;
const EXIT_BIND: i32 = 5;
const EXIT_IO: i32 = 6;

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    std::process::exit(run());
}

fn run() -> i32 {
    let mut args = std::env::args().skip(1);
    let config_path = match (args.next(), args.next()) {
        (Some(path), None) => path,
        _ => {
            eprintln!("usage: vhostd <config-file>");
            return EXIT_USAGE;
        }
    };

    let cfg = match Config::load(config_path.as_ref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            return match e {
                ConfigError::Missing(_) => EXIT_CONFIG_MISSING,
                ConfigError::Unreadable(..) | ConfigError::Invalid(_) => EXIT_CONFIG_UNREADABLE,
                ConfigError::BadValues(_) => EXIT_CONFIG_BAD_VALUES,
            };
        }
    };

    // Everything runs on this one thread: the accept loop, every
    // connection state machine, cache access, and CGI waits.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("cannot start runtime: {e}");
            return EXIT_IO;
        }
    };

    runtime.block_on(async {
        let server = match Server::bind(cfg).await {
            Ok(server) => server,
            Err(e) => {
                error!("{e:#}");
                return EXIT_BIND;
            }
        };

        match server.local_addr() {
            Ok(addr) => info!("server listening at port {}", addr.port()),
            Err(e) => {
                error!("cannot resolve listening address: {e}");
                return EXIT_IO;
            }
        }

        let (tx, rx) = mpsc::channel(8);
        let _admin = admin::spawn(tx);

        match server.run(rx).await {
            Ok(()) => 0,
            Err(e) => {
                error!("server loop failed: {e:#}");
                EXIT_IO
            }
        }
    })
}
