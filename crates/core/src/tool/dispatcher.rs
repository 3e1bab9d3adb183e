use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::join_all;
use ghidra_assistant_model::{ModelTool, ToolCallRequest, ToolCallResult};
use serde_json::{Map, Value};

use super::{Error, JOB_ID_KEY, ToolCatalog, ToolResult};
use crate::event::{Disconnected, Event, EventSender};

type BoxedToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// What to do when the model asks for a tool that is not registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UnknownToolPolicy {
    /// Drop the call. The model sees no result for it.
    #[default]
    Skip,
    /// Answer the call with an error result so the model can recover.
    Answer,
}

/// Turns the tool calls of one assistant message into tool results.
pub struct ToolDispatcher {
    catalog: Arc<ToolCatalog>,
    unknown_tool_policy: UnknownToolPolicy,
    parallel: bool,
}

enum Plan<'a> {
    Skip,
    Answer(ToolCallResult),
    Run {
        req: &'a ToolCallRequest,
        label: String,
        fut: BoxedToolFuture,
    },
}

impl ToolDispatcher {
    pub(crate) fn new(
        catalog: ToolCatalog,
        unknown_tool_policy: UnknownToolPolicy,
        parallel: bool,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            unknown_tool_policy,
            parallel,
        }
    }

    /// Returns the catalog this dispatcher looks tools up in.
    #[inline]
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    #[inline]
    pub(crate) fn definitions(&self) -> Vec<ModelTool> {
        self.catalog.definitions()
    }

    /// Executes the given calls and returns their results in call order.
    ///
    /// A progress event is emitted right before each tool starts. Calls to
    /// unknown tools are handled according to the configured
    /// [`UnknownToolPolicy`] and never announced. Tool failures are turned
    /// into error results, only a dropped event receiver stops the
    /// dispatch.
    pub async fn dispatch(
        &self,
        calls: &[ToolCallRequest],
        job_id: &str,
        events: &EventSender,
    ) -> Result<Vec<ToolCallResult>, Disconnected> {
        let plans = calls.iter().map(|req| self.plan(req, job_id));
        if self.parallel {
            return self.dispatch_parallel(plans.collect(), events).await;
        }

        let mut results = Vec::with_capacity(calls.len());
        for plan in plans {
            match plan {
                Plan::Skip => {}
                Plan::Answer(result) => results.push(result),
                Plan::Run { req, label, fut } => {
                    events.emit(Event::tool_call(label)).await?;
                    let output = fut.await;
                    results.push(to_result(req, output));
                }
            }
        }
        Ok(results)
    }

    async fn dispatch_parallel(
        &self,
        plans: Vec<Plan<'_>>,
        events: &EventSender,
    ) -> Result<Vec<ToolCallResult>, Disconnected> {
        // Announce everything first, the tools then run concurrently.
        let announcements: Vec<Event> = plans
            .iter()
            .filter_map(|plan| match plan {
                Plan::Run { label, .. } => Some(Event::tool_call(label.as_str())),
                _ => None,
            })
            .collect();
        for event in announcements {
            events.emit(event).await?;
        }

        let mut results = Vec::with_capacity(plans.len());
        let mut running = vec![];
        for plan in plans {
            match plan {
                Plan::Skip => {}
                Plan::Answer(result) => results.push(Some(result)),
                Plan::Run { req, fut, .. } => {
                    running.push((results.len(), req, fut));
                    results.push(None);
                }
            }
        }

        let (slots, futs): (Vec<_>, Vec<_>) = running
            .into_iter()
            .map(|(slot, req, fut)| ((slot, req), fut))
            .unzip();
        for ((slot, req), output) in slots.into_iter().zip(join_all(futs).await)
        {
            results[slot] = Some(to_result(req, output));
        }
        Ok(results.into_iter().flatten().collect())
    }

    fn plan<'a>(&self, req: &'a ToolCallRequest, job_id: &str) -> Plan<'a> {
        let Some(tool) = self.catalog.get(&req.name) else {
            warn!("tool not found: {}", req.name);
            return match self.unknown_tool_policy {
                UnknownToolPolicy::Skip => Plan::Skip,
                UnknownToolPolicy::Answer => Plan::Answer(to_result(
                    req,
                    Err(Error::unknown_tool(&req.name)),
                )),
            };
        };

        let arguments = prepare_arguments(&req.arguments, job_id);
        trace!("running a tool ({}) with args: {arguments:?}", req.id);
        Plan::Run {
            req,
            label: self.catalog.describe(&req.name),
            fut: tool.execute(Value::Object(arguments)),
        }
    }
}

/// Repairs the raw arguments of a tool call and scopes them to the job.
///
/// Arguments that are not a JSON object (malformed, empty, or some other
/// JSON value) are replaced by an empty object. A missing or `null`
/// `job_id` is filled in with the conversation's job, an explicit one is
/// kept as is.
pub fn prepare_arguments(raw: &str, job_id: &str) -> Map<String, Value> {
    let mut arguments = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!("tool arguments are not an object: {other}");
            Map::new()
        }
        Err(err) => {
            if !raw.trim().is_empty() {
                warn!("malformed tool arguments ({err}): {raw}");
            }
            Map::new()
        }
    };
    match arguments.get(JOB_ID_KEY) {
        None | Some(Value::Null) => {
            arguments.insert(
                JOB_ID_KEY.to_owned(),
                Value::String(job_id.to_owned()),
            );
        }
        Some(_) => {}
    }
    arguments
}

fn to_result(req: &ToolCallRequest, output: ToolResult) -> ToolCallResult {
    let content = match output {
        Ok(value) => value,
        Err(err) => {
            debug!("tool `{}` failed: {err}", req.name);
            err.to_value()
        }
    };
    ToolCallResult {
        id: req.id.clone(),
        name: req.name.clone(),
        content: content.to_string(),
    }
}
