//! HTTP server setup
//!
//! Builds the actix application: request logging, the admission pipeline
//! wrapping every route, and the note/health endpoints.

use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware::Logger, web};

use crate::{api, middleware::admission::Admission, model::app_state::AppState};

/// Creates and binds the HTTP server.
pub fn http_server(
    app_state: Arc<AppState>,
    address: String,
    port: u16,
) -> Result<Server, std::io::Error> {
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Admission)
            .app_data(web::Data::from(app_state.clone()))
            .service(api::health::health)
            .service(api::notes::routes())
    })
    .bind((address, port))?
    .run())
}
