use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use log::info;

use matchmaking::service::MatchmakingService;
use players::registry::PlayerRegistry;
use probe::{InfoProbe, ProbeClient};
use queueing::game_server::GameServerRegistry;
use queueing::service::QueueService;
use webfront::{InstanceStatusSource, WebfrontClient};

pub mod config;
mod matchmaking;
mod players;
mod probe;
mod queueing;
mod server;
mod webfront;

#[cfg(test)]
mod testing;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let app_config = config::AppConfig::default();

    let players = Arc::new(PlayerRegistry::new());
    let servers = Arc::new(GameServerRegistry::new());
    let probe: Arc<dyn InfoProbe> = Arc::new(ProbeClient::bind().await?);
    let webfront: Option<Arc<dyn InstanceStatusSource>> = app_config
        .webfront_base_url
        .clone()
        .map(|url| Arc::new(WebfrontClient::new(url)) as Arc<dyn InstanceStatusSource>);

    let queueing = QueueService::new(
        servers,
        Arc::clone(&probe),
        webfront,
        app_config.queueing.clone(),
    );
    let matchmaking = MatchmakingService::new(
        Arc::clone(&queueing),
        probe,
        app_config.matchmaking.clone(),
    );
    matchmaking.start();

    let state = web::Data::new(server::state::AppState::new(
        players,
        Arc::clone(&queueing),
        Arc::clone(&matchmaking),
    ));

    info!(
        "[Main] Listening on {}:{}",
        app_config.bind_addr, app_config.bind_port
    );
    let result = HttpServer::new(move || {
        App::new()
            .wrap(
                actix_web::middleware::DefaultHeaders::new()
                    .add(("Access-Control-Allow-Origin", "*"))
                    .add(("Access-Control-Allow-Headers", "*")),
            )
            .app_data(state.clone())
            .configure(server::router::config)
    })
    .bind((app_config.bind_addr.as_str(), app_config.bind_port))?
    .run()
    .await;

    matchmaking.stop();
    queueing.cancel_all();
    result
}
