//! Line-delimited JSON front for the pledge exchange.
//!
//! Each stdin line carries one [`ServeRequest`]; replies are written to stdout
//! as they complete, tagged with the request's `id`. Requests run
//! concurrently, so replies may come back out of order.

use std::sync::Arc;

use satfund_campaign::{PledgeRequest, PledgeResponse, PledgeService};
use satfund_db_store_sled::SledBackend;
use satfund_primitives::ids::{ProjectId, UserId};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{stdin, stdout, AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tracing::*;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServeRequest {
    #[serde(default)]
    id: Option<u64>,
    user: UserId,
    project: ProjectId,
    request: PledgeRequest,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ServeError {
    kind: &'static str,
    message: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ServeReply {
    id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<PledgeResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ServeError>,
}

impl ServeReply {
    fn ok(id: Option<u64>, result: PledgeResponse) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Option<u64>, kind: &'static str, message: String) -> Self {
        Self {
            id,
            result: None,
            error: Some(ServeError { kind, message }),
        }
    }
}

async fn handle_line(service: &PledgeService<SledBackend>, line: &str) -> ServeReply {
    let req = match serde_json::from_str::<ServeRequest>(line) {
        Ok(req) => req,
        Err(e) => return ServeReply::err(None, "MalformedInput", e.to_string()),
    };
    match service.handle(req.user, req.project, req.request).await {
        Ok(resp) => ServeReply::ok(req.id, resp),
        Err(e) => ServeReply::err(req.id, e.kind(), e.to_string()),
    }
}

/// Serves requests until stdin closes and every reply is written.
pub(crate) async fn serve_stdin(service: Arc<PledgeService<SledBackend>>) -> anyhow::Result<()> {
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServeReply>(64);

    let writer = tokio::spawn(async move {
        let mut out = stdout();
        while let Some(reply) = reply_rx.recv().await {
            let mut buf = serde_json::to_vec(&reply)?;
            buf.push(b'\n');
            out.write_all(&buf).await?;
            out.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut lines = BufReader::new(stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let service = service.clone();
        let reply_tx = reply_tx.clone();
        tokio::spawn(async move {
            let reply = handle_line(&service, &line).await;
            if reply_tx.send(reply).await.is_err() {
                warn!("reply writer stopped, dropping reply");
            }
        });
    }
    debug!("stdin closed, draining replies");

    drop(reply_tx);
    writer.await?
}
