use futures_util::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogLookup;
use crate::constants::*;
use crate::error::AppError;
use crate::llm::types::{LlmMessage, LlmRequest};
use crate::llm::TextStream;
use crate::models::ChatMessage;

use super::context::TurnContext;
use super::tools::process_tool_calls;

/// 呼び出し元の履歴を検証し、LLMメッセージに変換する
///
/// Only `user` and `assistant` turns may come from the caller; order is preserved.
pub fn validate_history(messages: Vec<ChatMessage>) -> Result<Vec<LlmMessage>, AppError> {
    if messages.is_empty() {
        return Err(AppError::InvalidInput(
            "messages must contain at least one message".to_string(),
        ));
    }

    messages
        .into_iter()
        .enumerate()
        .map(|(index, message)| match message.role.as_str() {
            ROLE_USER => Ok(LlmMessage::user(message.content)),
            ROLE_ASSISTANT => Ok(LlmMessage::assistant(message.content)),
            other => Err(AppError::InvalidInput(format!(
                "messages[{index}]: role '{other}' is not allowed"
            ))),
        })
        .collect()
}

/// 最初のメッセージ = 履歴内のユーザーメッセージがちょうど1件
fn is_first_message(history: &[LlmMessage]) -> bool {
    history.iter().filter(|m| m.role == ROLE_USER).count() == 1
}

/// メインエントリーポイント: 1ターン分の会話を処理し、最終回答のストリームを返す
///
/// Primary completion (non-streaming, with tools) decides whether tools are needed.
/// With no tool calls the answer is streamed straight away; otherwise every call is
/// dispatched in order and a final streaming completion sees the results.
pub async fn run_chat_turn(ctx: &TurnContext, history: Vec<LlmMessage>) -> Result<TextStream, AppError> {
    let org_id = ctx.tools.organization_id().to_string();

    // 1. 初回メッセージならブロック一覧を取得（キャッシュ優先）
    let catalog = if is_first_message(&history) {
        let client = ctx.tools.client.clone();
        let lookup = ctx
            .until_cancelled(
                ctx.tools
                    .catalog
                    .get_or_fetch(&org_id, || async move { client.get_all_blocks().await }),
            )
            .await?;
        // 今回取得した一覧は getAllBlocks でも使い回す
        if let CatalogLookup::Fetched(fetched) = &lookup {
            ctx.tools.record_fetched_catalog(fetched.clone());
        }
        Some(lookup.into_catalog())
    } else {
        ctx.tools.catalog.get(&org_id).await
    };

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(LlmMessage::system(ctx.instructions.system_prompt(catalog.as_ref())));
    messages.extend(history);

    // 2. ツール呼び出しの有無を判定
    let primary = LlmRequest {
        model: ctx.model.clone(),
        messages: messages.clone(),
        temperature: ctx.temperature,
        tools: Some(ctx.tool_registry.definitions()),
    };
    let response = ctx.until_cancelled(ctx.provider.complete(&primary)).await?;
    tracing::debug!(
        org = %org_id,
        model = %response.model,
        input_tokens = response.token_usage.input_tokens,
        output_tokens = response.token_usage.output_tokens,
        finish_reason = ?response.finish_reason,
        "primary completion finished"
    );

    if response.tool_calls.is_empty() {
        tracing::debug!(org = %org_id, "no tool calls, streaming answer directly");
        return open_final_stream(ctx, messages).await;
    }

    // 3. ツールを順番に実行
    tracing::info!(
        org = %org_id,
        count = response.tool_calls.len(),
        "model requested tool calls"
    );
    let results = process_tool_calls(&response.tool_calls, ctx).await?;

    // 4. ツール結果を履歴に追加して最終回答をストリーム
    messages.push(LlmMessage::assistant_tool_calls(
        response.content,
        response.tool_calls,
    ));
    messages.extend(results.into_iter().map(LlmMessage::tool_result));

    open_final_stream(ctx, messages).await
}

async fn open_final_stream(ctx: &TurnContext, messages: Vec<LlmMessage>) -> Result<TextStream, AppError> {
    let request = LlmRequest {
        model: ctx.model.clone(),
        messages,
        temperature: ctx.temperature,
        tools: None,
    };
    let mut text = ctx.until_cancelled(ctx.provider.stream(&request)).await?;

    // 最初のチャンクまで待ち、開始前の失敗はレスポンス確定前にエラーとして返す
    let first = ctx
        .until_cancelled(async { Ok::<_, AppError>(text.next().await) })
        .await?;
    let text = match first {
        Some(Err(e)) => return Err(e),
        Some(Ok(chunk)) => stream::once(async move { Ok(chunk) }).chain(text).boxed(),
        None => text,
    };
    Ok(until_cancelled_stream(text, ctx.cancel.clone()))
}

/// Ends the stream with `Cancelled` as soon as the token fires.
fn until_cancelled_stream(text: TextStream, cancel: CancellationToken) -> TextStream {
    stream::unfold(Some((text, cancel)), |state| async move {
        let (mut text, cancel) = state?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Some((Err(AppError::Cancelled), None)),
            item = text.next() => item.map(|item| (item, Some((text, cancel)))),
        }
    })
    .boxed()
}
