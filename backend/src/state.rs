use std::sync::Arc;

use crate::{
    config::Config,
    repositories::{SessionRepository, UserStore},
    services::{AccountService, AuthService, LinkSettings, SessionStore, UserDirectory},
    utils::{
        email::{EmailDispatcher, EmailSender},
        jwt::TokenCodec,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserStore>,
    pub auth: AuthService,
    pub accounts: AccountService,
    pub directory: UserDirectory,
}

impl AppState {
    /// Wires the services once; every handler shares the result.
    pub fn new(
        config: Config,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionRepository>,
        email_sender: Arc<dyn EmailSender>,
    ) -> Self {
        let sessions = SessionStore::new(sessions);
        let codec = TokenCodec::from_config(&config);
        let auth = AuthService::from_config(&config, users.clone(), sessions.clone(), codec);
        let dispatcher = EmailDispatcher::from_config(email_sender, &config.email);
        let directory = UserDirectory::new(users.clone(), sessions.clone());
        let accounts = AccountService::new(
            users.clone(),
            sessions,
            dispatcher,
            LinkSettings::from_config(&config),
        );

        Self {
            config: Arc::new(config),
            users,
            auth,
            accounts,
            directory,
        }
    }
}
