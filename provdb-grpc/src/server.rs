// SPDX-License-Identifier: AGPL-3.0-or-later
// ProvDB - Columnar Provenance Index for Software Archives
// Copyright (C) 2026 The ProvDB Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! ProvenanceService server implementation
//!
//! A thin facade: parse the mask, hand the lookup to the blocking engine,
//! translate errors. `WhereAreOne` answers element by element; a failing
//! element degrades to an empty result (logged and counted) because a gRPC
//! stream can only fail as a whole and one bad input must not take down its
//! 9,999 siblings. The stream closes early when the consumer hangs up.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use provdb_core::metrics::Metrics;
use provdb_query::{FieldSelection, QueryEngine, WhereIs};

use crate::error::status_from;
use crate::proto;
use crate::proto::provenance_service_server::{ProvenanceService, ProvenanceServiceServer};

/// Inputs processed per engine batch while streaming.
const STREAM_CHUNK: usize = 256;

pub struct ProvenanceGrpc {
    engine: Arc<QueryEngine>,
    metrics: Metrics,
}

impl ProvenanceGrpc {
    pub fn new(engine: Arc<QueryEngine>, metrics: Metrics) -> Self {
        Self { engine, metrics }
    }

    pub fn into_service(self) -> ProvenanceServiceServer<Self> {
        ProvenanceServiceServer::new(self)
    }
}

fn to_proto(result: WhereIs) -> proto::WhereIsOneResult {
    proto::WhereIsOneResult {
        swhid: result.swhid,
        anchor: result.anchor,
        origin: result.origin,
    }
}

fn empty_result(swhid: String, fields: &FieldSelection) -> proto::WhereIsOneResult {
    proto::WhereIsOneResult {
        swhid: if fields.swhid { swhid } else { String::new() },
        anchor: None,
        origin: None,
    }
}

#[tonic::async_trait]
impl ProvenanceService for ProvenanceGrpc {
    async fn where_is_one(
        &self,
        request: Request<proto::WhereIsOneRequest>,
    ) -> Result<Response<proto::WhereIsOneResult>, Status> {
        let started = Instant::now();
        self.metrics.incr("grpc.where_is_one.requests");
        let request = request.into_inner();
        tracing::debug!(swhid = %request.swhid, "where_is_one");

        let fields =
            FieldSelection::from_mask(request.mask.as_deref().unwrap_or("")).map_err(status_from)?;
        let engine = Arc::clone(&self.engine);
        let result = tokio::task::spawn_blocking(move || {
            engine.where_is_one(&request.swhid, &fields)
        })
        .await
        .map_err(|e| Status::internal(format!("lookup task panicked: {e}")))?
        .map_err(status_from)?;

        self.metrics.time("grpc.where_is_one.duration", started.elapsed());
        Ok(Response::new(to_proto(result)))
    }

    type WhereAreOneStream = ReceiverStream<Result<proto::WhereIsOneResult, Status>>;

    async fn where_are_one(
        &self,
        request: Request<proto::WhereAreOneRequest>,
    ) -> Result<Response<Self::WhereAreOneStream>, Status> {
        let request = request.into_inner();
        self.metrics.incr("grpc.where_are_one.requests");
        tracing::debug!(count = request.swhid.len(), "where_are_one");

        let fields =
            FieldSelection::from_mask(request.mask.as_deref().unwrap_or("")).map_err(status_from)?;
        let engine = Arc::clone(&self.engine);
        let metrics = self.metrics.clone();
        let (tx, rx) = tokio::sync::mpsc::channel(STREAM_CHUNK);

        tokio::task::spawn_blocking(move || {
            'outer: for chunk in request.swhid.chunks(STREAM_CHUNK) {
                let results = engine.where_are_one(chunk, &fields);
                for (swhid, result) in chunk.iter().zip(results) {
                    let item = match result {
                        Ok(found) => to_proto(found),
                        Err(e) => {
                            tracing::warn!(swhid = %swhid, "batched lookup element failed: {e}");
                            metrics.incr("grpc.where_are_one.element_errors");
                            empty_result(swhid.clone(), &fields)
                        }
                    };
                    if tx.blocking_send(Ok(item)).is_err() {
                        tracing::debug!("consumer hung up, closing stream");
                        break 'outer;
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Runs the service with health checking and reflection until shutdown.
pub async fn serve(
    engine: Arc<QueryEngine>,
    bind: SocketAddr,
    metrics: Metrics,
) -> anyhow::Result<()> {
    let service = ProvenanceGrpc::new(engine, metrics).into_service();

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<ProvenanceServiceServer<ProvenanceGrpc>>()
        .await;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
        .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET)
        .build_v1()?;

    tracing::info!("serving ProvenanceService on {bind}");
    Server::builder()
        .add_service(service)
        .add_service(health_service)
        .add_service(reflection)
        .serve(bind)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_proto_round_trip() {
        let result = WhereIs {
            swhid: "swh:1:cnt:94a9ed024d3859793618152ea559a168bbcbb5e2".into(),
            anchor: Some("swh:1:rev:0000000000000000000000000000000000000001".into()),
            origin: None,
        };
        let message = to_proto(result.clone());
        assert_eq!(message.swhid, result.swhid);
        assert_eq!(message.anchor, result.anchor);
        assert_eq!(message.origin, None);
    }

    #[test]
    fn test_empty_result_honors_mask() {
        let fields = FieldSelection::from_mask("anchor").unwrap();
        let message = empty_result("swh:1:cnt:aa".into(), &fields);
        assert_eq!(message.swhid, "");
        assert_eq!(message.anchor, None);
    }
}
