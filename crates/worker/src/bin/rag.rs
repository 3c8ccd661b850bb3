//! RAG room assistant: answers from the persisted document index

use room_assistant_agent::AgentVariant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    room_assistant_worker::main_for(AgentVariant::Rag).await
}
