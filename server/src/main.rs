//! Server binary: wires the transport, the authenticator and the store
//! together and then parks, leaving all work to the listener threads.

use clap::Parser;
use log::{error, info};
use std::process::exit;
use std::sync::Arc;

use server::auth::Authenticator;
use server::db::{DatabaseManager, MemoryDb};
use server::server::Server;
use server::transport::MessageExchanger;

#[derive(Parser, Debug)]
#[command(name = "skyfire-server", about = "Authoritative Skyfire game server")]
struct Args {
    /// Directory holding the named-pipe channels
    #[arg(long, default_value = "/tmp/skyfire")]
    pipe_dir: String,

    /// File whose first line is the token-signing secret
    #[arg(long, default_value = "keys/hmac.key")]
    key_file: String,

    /// Username granted administrator rights at startup
    #[arg(long)]
    admin_user: Option<String>,

    /// Password for the startup administrator
    #[arg(long, default_value = "admin")]
    admin_password: String,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let auth = match Authenticator::from_key_file(&args.key_file) {
        Ok(auth) => auth,
        Err(e) => {
            error!("Cannot load signing key: {}", e);
            exit(1);
        }
    };

    let db = match MemoryDb::with_stock_campaign() {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Cannot seed the level store: {}", e);
            exit(1);
        }
    };
    if let Some(admin) = &args.admin_user {
        db.add_admin(admin, &args.admin_password);
        info!("Administrator `{}` registered", admin);
    }

    let transport = Arc::new(MessageExchanger::new(&args.pipe_dir));
    if let Err(e) = transport.init() {
        error!("Cannot initialize transport: {}", e);
        exit(1);
    }

    let server = Server::new(transport, auth, db as Arc<dyn DatabaseManager>);
    if let Err(e) = server.start() {
        error!("Cannot start listeners: {}", e);
        exit(1);
    }
    info!("Server ready on {}", args.pipe_dir);

    loop {
        std::thread::park();
    }
}
