use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use ghidra_assistant_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::{ChunksError, Sse, SseError};
use crate::proto::{ChatCompletion, ChatCompletionChunk, ToolCall};

struct PartialState {
    sse: Sse,
    id: Option<String>,
    ended: bool,
    tool_calls: Vec<ToolCall>,
    // Indexes of the tool calls that are received but not yet delivered.
    // Tool calls are only delivered once the finish reason arrives (or the
    // stream ends), since their arguments are streamed in fragments.
    pending_tool_call_idx: VecDeque<usize>,
    // This field will be cleared after the response returns the complete event.
    pending_finish_reason: Option<ModelFinishReason>,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A response from an OpenAI-compatible backend, either streamed over
    /// SSE or decoded from a complete JSON body.
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
        buffered: VecDeque<ModelResponseEvent>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            ended: false,
            tool_calls: Default::default(),
            pending_tool_call_idx: Default::default(),
            pending_finish_reason: Default::default(),
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
            buffered: Default::default(),
        }
    }

    pub(crate) fn from_completion(
        mut completion: ChatCompletion,
    ) -> Result<Self, Error> {
        if completion.choices.is_empty() {
            return Err(Error::new("completion has no choices", ErrorKind::Other));
        }
        let choice = completion.choices.swap_remove(0);

        let mut buffered = VecDeque::new();
        if let Some(content) = choice.message.content.filter(|c| !c.is_empty()) {
            buffered.push_back(ModelResponseEvent::MessageDelta(content));
        }
        let tool_calls = choice.message.tool_calls.unwrap_or_default();
        let has_tool_calls = !tool_calls.is_empty();
        for tool_call in &tool_calls {
            buffered.push_back(ModelResponseEvent::ToolCall(tool_call.to_request()));
        }
        let finish_reason = match choice.finish_reason.as_deref() {
            Some(reason) => finish_reason(reason),
            None if has_tool_calls => ModelFinishReason::ToolCalls,
            None => ModelFinishReason::Stop,
        };
        buffered.push_back(ModelResponseEvent::Completed(finish_reason));

        Ok(Self {
            next_event_fut: None,
            buffered,
        })
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        if let Some(event) = this.buffered.pop_front() {
            return Poll::Ready(Ok(Some(event)));
        }
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

#[inline]
fn finish_reason(reason: &str) -> ModelFinishReason {
    if reason == "tool_calls" {
        ModelFinishReason::ToolCalls
    } else {
        ModelFinishReason::Stop
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    let mut message_delta = None;

    while !partial_state.ended {
        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                partial_state.ended = true;
                break;
            }
            Err(SseError::ChunksError(ChunksError::Timeout)) => {
                return Err(Error::new("stream read timed out", ErrorKind::Timeout));
            }
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            partial_state.ended = true;
            break;
        }

        let mut chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        if partial_state.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id
        {
            return Err(Error::new("chunk id mismatch", ErrorKind::Other));
        };

        // Usage reports and content filter notices come without choices.
        let Some(choice) = chunk.choices.pop() else {
            continue;
        };

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            message_delta = Some(content);
        }
        if let Some(tool_calls) = choice.delta.tool_calls {
            merge_tool_calls(&mut partial_state, tool_calls);
        }

        if let Some(reason) = choice.finish_reason {
            partial_state.pending_finish_reason = Some(finish_reason(&reason));
            break;
        }
        if message_delta.is_some() {
            break;
        }
    }

    // The order of events are important. Always emit message delta first, then
    // emit pending tool calls, and finally emit pending finish reason if any.

    if let Some(message_delta) = message_delta {
        return Ok((
            Some(ModelResponseEvent::MessageDelta(message_delta)),
            partial_state,
        ));
    }

    if let Some(idx) = partial_state.pending_tool_call_idx.pop_front() {
        let request = partial_state.tool_calls[idx].to_request();
        return Ok((Some(ModelResponseEvent::ToolCall(request)), partial_state));
    }

    if let Some(finish_reason) = partial_state.pending_finish_reason.take() {
        return Ok((
            Some(ModelResponseEvent::Completed(finish_reason)),
            partial_state,
        ));
    }

    Ok((None, partial_state))
}

fn merge_tool_calls(partial_state: &mut PartialState, tool_calls: Vec<ToolCall>) {
    for tool_call in tool_calls {
        let Some(partial_tool_call) =
            find_partial_tool_call(&partial_state.tool_calls, &tool_call)
                .map(|idx| &mut partial_state.tool_calls[idx])
        else {
            partial_state
                .pending_tool_call_idx
                .push_back(partial_state.tool_calls.len());
            partial_state.tool_calls.push(tool_call);
            continue;
        };
        // Patch the partial tool call.
        if let Some(id) = tool_call.id {
            // Index-less backends repeat the full id on every fragment.
            if partial_tool_call.id.as_ref() != Some(&id) {
                partial_tool_call.id.get_or_insert_default().push_str(&id);
            }
        }
        if let Some(ty) = tool_call.r#type {
            partial_tool_call.r#type.get_or_insert_default().push_str(&ty);
        }
        if let Some(function) = tool_call.function {
            match partial_tool_call.function {
                Some(ref mut partial_func) => {
                    if let Some(name) = function.name {
                        partial_func.name.get_or_insert_default().push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial_func
                            .arguments
                            .get_or_insert_default()
                            .push_str(&arguments);
                    }
                }
                None => partial_tool_call.function = Some(function),
            }
        }
    }
}

/// Finds the partial call a fragment belongs to. Fragments are keyed by
/// `index`; backends that omit it repeat the `id` instead, or send it only
/// on the first fragment of a call.
fn find_partial_tool_call(
    tool_calls: &[ToolCall],
    fragment: &ToolCall,
) -> Option<usize> {
    match (fragment.index, &fragment.id) {
        (Some(_), _) => tool_calls.iter().position(|t| t.index == fragment.index),
        (None, Some(id)) => tool_calls
            .iter()
            .position(|t| t.index.is_none() && t.id.as_ref() == Some(id)),
        (None, None) => tool_calls
            .len()
            .checked_sub(1)
            .filter(|&last| tool_calls[last].index.is_none()),
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use ghidra_assistant_model::ToolCallRequest;

    use super::*;
    use crate::io::Chunks;

    async fn collect(resp: OpenAIResponse) -> Vec<ModelResponseEvent> {
        let mut resp = pin!(resp);
        let mut events = vec![];
        while let Some(event) = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap()
        {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_streamed_tool_calls() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(include_bytes!(
                "../fixtures/test_response.txt"
            ))]
            .into(),
        );
        let events = collect(OpenAIResponse::from_sse(Sse::new(chunks))).await;
        assert_eq!(
            events,
            [
                ModelResponseEvent::MessageDelta("Let me look.".to_owned()),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_a".to_owned(),
                    name: "list_functions".to_owned(),
                    arguments: r#"{"job_id": "job-1"}"#.to_owned(),
                }),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_b".to_owned(),
                    name: "list_imports".to_owned(),
                    arguments: "{}".to_owned(),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_without_done_marker() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(
                    br#"data: {"id":"c1","choices":[{"delta":{"content":"main"},"finish_reason":null}]}"#,
                ),
                Bytes::from_static(b"\n\n"),
                Bytes::from_static(
                    br#"data: {"id":"c1","choices":[{"delta":{"content":" and init"},"finish_reason":"stop"}]}"#,
                ),
                Bytes::from_static(b"\n\n"),
            ]
            .into(),
        );
        let events = collect(OpenAIResponse::from_sse(Sse::new(chunks))).await;
        assert_eq!(
            events,
            [
                ModelResponseEvent::MessageDelta("main".to_owned()),
                ModelResponseEvent::MessageDelta(" and init".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn test_streamed_tool_calls_without_index() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(concat!(
                r#"data: {"id":"c","choices":[{"delta":{"tool_calls":[{"id":"call_a","type":"function","function":{"name":"decompile_function","arguments":"{\"addr\""}}]},"finish_reason":null}]}"#, "\n\n",
                r#"data: {"id":"c","choices":[{"delta":{"tool_calls":[{"id":"call_a","function":{"arguments":": \"0x401000\"}"}}]},"finish_reason":null}]}"#, "\n\n",
                r#"data: {"id":"c","choices":[{"delta":{"tool_calls":[{"id":"call_b","type":"function","function":{"name":"get_xrefs","arguments":"{\"addr\""}}]},"finish_reason":null}]}"#, "\n\n",
                r#"data: {"id":"c","choices":[{"delta":{"tool_calls":[{"function":{"arguments":": \"0x402000\"}"}}]},"finish_reason":null}]}"#, "\n\n",
                r#"data: {"id":"c","choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#, "\n\n",
                "data: [DONE]\n\n",
            ).as_bytes())]
            .into(),
        );
        let events = collect(OpenAIResponse::from_sse(Sse::new(chunks))).await;
        assert_eq!(
            events,
            [
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_a".to_owned(),
                    name: "decompile_function".to_owned(),
                    arguments: r#"{"addr": "0x401000"}"#.to_owned(),
                }),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_b".to_owned(),
                    name: "get_xrefs".to_owned(),
                    arguments: r#"{"addr": "0x402000"}"#.to_owned(),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );
    }

    #[tokio::test]
    async fn test_chunk_id_mismatch() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(
                b"data: {\"id\":\"a\",\"choices\":[{\"delta\":{\"content\":\"x\"},\"finish_reason\":null}]}\n\n\
                  data: {\"id\":\"b\",\"choices\":[{\"delta\":{\"content\":\"y\"},\"finish_reason\":null}]}\n\n",
            )]
            .into(),
        );
        let mut resp = pin!(OpenAIResponse::from_sse(Sse::new(chunks)));
        let first = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(matches!(first, Ok(Some(ModelResponseEvent::MessageDelta(_)))));
        let second = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert_eq!(second.unwrap_err().message(), "chunk id mismatch");
    }

    #[tokio::test]
    async fn test_buffered_completion() {
        let completion: ChatCompletion = serde_json::from_str(
            r#"{
                "id": "chatcmpl-1",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": { "name": "do_magic", "arguments": "{oops" }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            }"#,
        )
        .unwrap();
        let events =
            collect(OpenAIResponse::from_completion(completion).unwrap()).await;
        assert_eq!(
            events,
            [
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_1".to_owned(),
                    name: "do_magic".to_owned(),
                    arguments: "{oops".to_owned(),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );
    }

    #[test]
    fn test_completion_without_choices() {
        let completion = ChatCompletion { choices: vec![] };
        assert!(OpenAIResponse::from_completion(completion).is_err());
    }
}
