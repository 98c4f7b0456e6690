use actix_web::web;

use crate::server::introspect::list_queues;
use crate::server::session::ws_queue;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws/queue").to(ws_queue))
        .service(web::resource("/queues").to(list_queues));
}
