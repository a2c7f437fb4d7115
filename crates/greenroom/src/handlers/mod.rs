//! Command handlers.
//!
//! Each handler is a method on [`ServerState`]. The shared entry point
//! [`ServerState::handle_command`] drops commands from sessions that are no
//! longer active, audit-logs the request, runs the handler and logs any
//! error it returns. Handlers never report errors to the client; a failed
//! command simply gets no answer.

mod games;
mod login;
mod players;
mod status;

use greenroom_protocol::{Answer, Command, FrameFlag, Verb};
use greenroom_session::{Authorizer, ClientSession, SessionStore};
use greenroom_stats::GameDatabase;
use greenroom_transport::Client;
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::GreenroomError;
use crate::server::ServerState;

pub use status::MATCHMAKE_PERMISSION;

/// The single lobby every game is listed in.
const LOBBY_ID: u32 = 1;

impl<S, D, A> ServerState<S, D, A>
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    /// Runs the handler for `verb`.
    pub(crate) async fn handle_command(&self, session: &ClientSession, verb: Verb, command: Command) {
        let conn = session.id();
        if !session.is_active() {
            tracing::debug!(%conn, %verb, "client left, command dropped");
            return;
        }

        self.audit.request(&command).await;
        tracing::debug!(%conn, %verb, tid = command.tid(), "handling command");

        let result = match verb {
            Verb::Conn => self.handle_conn(session, &command).await,
            Verb::User => self.handle_user(session, &command).await,
            Verb::Llst => self.handle_llst(session, &command).await,
            Verb::Glst => self.handle_glst(session, &command).await,
            Verb::Gdat => self.handle_gdat(session, &command).await,
            Verb::Cgam => self.handle_cgam(session, &command).await,
            Verb::Ugam => self.handle_ugam(session, &command).await,
            Verb::Ubra => self.handle_ubra(session, &command).await,
            Verb::Egam => self.handle_egam(session, &command).await,
            Verb::Egrs => self.handle_egrs(session, &command).await,
            Verb::Ecnl => self.handle_ecnl(session, &command).await,
            Verb::Pent => self.handle_pent(session, &command).await,
            Verb::Plvt => self.handle_plvt(session, &command).await,
            Verb::Upla => self.handle_upla(session, &command).await,
            Verb::Status => self.handle_status(session, &command).await,
            Verb::Echo => {
                tracing::debug!(%conn, "ECHO is only answered over UDP");
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!(%conn, %verb, error = %e, "command failed");
        }
    }

    /// Sends an answer to `client` and records it in the audit trail.
    pub(crate) async fn respond(
        &self,
        client: &Client,
        query: &str,
        answer: Answer,
        flag: FrameFlag,
    ) -> Result<(), GreenroomError> {
        self.audit.answer(query, &answer).await;
        client.write(query, answer, flag)?;
        Ok(())
    }
}

/// Random alphanumeric token for join tickets and game secrets.
fn random_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Collects the fields of `command` starting with `prefix` as stat pairs.
fn stat_pairs(command: &Command, prefix: &str) -> Vec<(String, String)> {
    command
        .fields_with_prefix(prefix)
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
