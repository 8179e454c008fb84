use std::path::Path;
use std::sync::Arc;

use dockhand_core::orchestrator::{
    FlowContext, LifecycleOrchestrator, NullSink, StatusSink, StatusUpdate, TokioDelay,
};
use dockhand_core::registry::UnitRegistry;
use dockhand_core::types::{Action, ActorId, Request, RoleId};

use super::load_settings;
use crate::output::print_json;

pub struct FlowArgs {
    pub action: Action,
    pub unit: String,
    pub actor: ActorId,
    pub groups: Vec<RoleId>,
    pub mention: Option<String>,
}

/// Prints the acknowledgment as soon as the flow publishes it.
struct AckPrinter;

impl StatusSink for AckPrinter {
    fn publish(&self, update: StatusUpdate) {
        if let StatusUpdate::Accepted { message, .. } = update {
            println!("{message}");
        }
    }
}

/// Run one start/stop/restart flow in the foreground.
pub fn run(path: &Path, args: FlowArgs, json: bool) -> anyhow::Result<()> {
    let settings = load_settings(path)?;
    let runtime = dockhand_docker::connect(&settings.runtime)?;

    let mut request = Request::new(args.actor, args.action, args.unit).with_groups(args.groups);
    if let Some(mention) = args.mention {
        request = request.with_mention(mention);
    }

    let status: Arc<dyn StatusSink> = if json {
        Arc::new(NullSink)
    } else {
        Arc::new(AckPrinter)
    };
    let ctx = FlowContext::new(Arc::new(settings.policy), status);
    let registry = Arc::new(UnitRegistry::new(runtime));
    let orchestrator =
        LifecycleOrchestrator::new(registry.clone(), Arc::new(TokioDelay), settings.docker);

    let rt = tokio::runtime::Runtime::new()?;
    let mention = request.mention.clone();
    let outcome = rt.block_on(async move {
        // Section grants are checked against the cached snapshot, so fill it
        // first. A failure here resurfaces when the flow resolves the unit.
        if let Err(e) = registry.refresh().await {
            tracing::warn!(error = %e, "initial registry refresh failed");
        }

        // Ctrl-C cancels the flow, which then finishes as `Cancelled`.
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
        orchestrator.handle_request(request, &ctx).await
    });
    let message = outcome.render(mention.as_deref());

    if json {
        print_json(&serde_json::json!({
            "outcome": outcome,
            "message": message,
        }))?;
    } else {
        println!("{message}");
    }

    if !outcome.is_success() {
        anyhow::bail!("request ended with {}", outcome.kind());
    }
    Ok(())
}
