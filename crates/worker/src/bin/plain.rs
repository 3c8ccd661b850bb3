//! Plain room assistant: system prompt and language model

use room_assistant_agent::AgentVariant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    room_assistant_worker::main_for(AgentVariant::Plain).await
}
