use std::net::{IpAddr, SocketAddr};

use log::info;
use warp::Filter;

use super::routes;
use super::types::WebState;
use crate::error_handling::types::WebError;

/// HTTP/WebSocket server for the sandbox and duel API.
pub struct WebServer {
    state: WebState,
}

impl WebServer {
    pub fn new(state: WebState) -> Self {
        Self { state }
    }

    /// Starts the server and serves until the process exits.
    pub async fn start(&self, bind_address: &str, port: u16) -> Result<(), WebError> {
        let ip: IpAddr = bind_address
            .parse()
            .map_err(|_| WebError::BadBindAddress(bind_address.to_string()))?;
        let addr: SocketAddr = (ip, port).into();

        let state = self.state.clone();
        let api = routes::launch_route(state.clone())
            .or(routes::connect_route(state.clone()))
            .or(routes::close_session_route(state.clone()))
            .or(routes::list_containers_route(state.clone()))
            .or(routes::my_containers_route(state.clone()))
            .or(routes::terminal_route(state.clone()))
            .or(routes::duel_terminal_route(state.clone()))
            .or(routes::queue_join_route(state.clone()))
            .or(routes::queue_leave_route(state.clone()))
            .or(routes::queue_status_route(state.clone()))
            .or(routes::challenge_route(state.clone()))
            .or(routes::challenge_respond_route(state.clone()))
            .or(routes::challenges_route(state.clone()))
            .or(routes::matches_route(state.clone()))
            .or(routes::match_route(state.clone()))
            .or(routes::match_cancel_route(state.clone()))
            .or(routes::match_status_route(state))
            .recover(routes::handle_rejection);

        info!("Web server listening on {}", addr);
        warp::serve(api).run(addr).await;

        Ok(())
    }
}
