use std::sync::Arc;

use teloxide::prelude::*;

use nb_core::{domain::ChatId, messaging::types::Command};

use crate::router::AppState;

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(cmd) = Command::parse(ChatId(msg.chat.id.0), text) else {
        return Ok(());
    };

    tracing::debug!(chat_id = cmd.chat_id.0, command = %cmd.name, "command received");
    state.commands.handle_command(&cmd).await;
    Ok(())
}
