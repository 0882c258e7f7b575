use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::error::RpcErr;
use crate::types::RpcRequest;

pub trait RpcHandler: Sized {
    fn parse(params: &Option<Vec<Value>>) -> Result<Self, RpcErr>;

    fn call(req: &RpcRequest, context: RpcApiContext) -> Result<Value, RpcErr> {
        let request = Self::parse(&req.params)?;
        request.handle(context)
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr>;
}

const MAX_GET_EVENTS: u64 = 1000;

fn param(params: &Option<Vec<Value>>, index: usize, name: &str) -> Result<Value, RpcErr> {
    params
        .as_ref()
        .and_then(|p| p.get(index))
        .cloned()
        .ok_or_else(|| RpcErr::MissingParam(name.into()))
}

fn parse_u64(value: &Value, name: &str) -> Result<u64, RpcErr> {
    value
        .as_u64()
        .ok_or_else(|| RpcErr::BadParams(format!("{name} must be a non-negative integer")))
}

pub struct LatestSeqRequest;

impl RpcHandler for LatestSeqRequest {
    fn parse(_params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        Ok(LatestSeqRequest)
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        Ok(json!(context.outbox.latest_seq()))
    }
}

pub struct GetEventRequest {
    seq: u64,
}

impl RpcHandler for GetEventRequest {
    fn parse(params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        Ok(GetEventRequest {
            seq: parse_u64(&param(params, 0, "seq")?, "seq")?,
        })
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        let envelope = context.outbox.read(self.seq)?;
        Ok(json!(envelope))
    }
}

pub struct GetEventsRequest {
    from_seq: u64,
    to_seq: u64,
}

impl RpcHandler for GetEventsRequest {
    fn parse(params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        Ok(GetEventsRequest {
            from_seq: parse_u64(&param(params, 0, "fromSeq")?, "fromSeq")?,
            to_seq: parse_u64(&param(params, 1, "toSeq")?, "toSeq")?,
        })
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        if self.from_seq > self.to_seq {
            return Err(RpcErr::InvalidRange {
                from_seq: self.from_seq,
                to_seq: self.to_seq,
            });
        }
        let span = self.to_seq - self.from_seq + 1;
        let limit = span.min(MAX_GET_EVENTS) as usize;
        let events = context.outbox.read_range(self.from_seq, limit)?;
        Ok(json!(events))
    }
}

pub struct CompactOutboxBelowRequest {
    safe_seq: u64,
}

impl RpcHandler for CompactOutboxBelowRequest {
    fn parse(params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        Ok(CompactOutboxBelowRequest {
            safe_seq: parse_u64(&param(params, 0, "safeSeq")?, "safeSeq")?,
        })
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        match context.outbox.compact_below(self.safe_seq) {
            Ok(()) => Ok(json!({
                "deleted": true,
                "safeSeq": context.outbox.lowest_seq(),
            })),
            Err(ubt_outbox::OutboxError::BoundsExceeded(msg)) => Err(RpcErr::BadParams(msg)),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct StatusRequest;

impl RpcHandler for StatusRequest {
    fn parse(_params: &Option<Vec<Value>>) -> Result<Self, RpcErr> {
        Ok(StatusRequest)
    }

    fn handle(&self, context: RpcApiContext) -> Result<Value, RpcErr> {
        Ok(json!({
            "enabled": true,
            "latestSeq": context.outbox.latest_seq(),
            "degraded": context.emitter.is_degraded(),
            "degradedReasonCode": context.emitter.degraded_reason(),
        }))
    }
}

pub fn dispatch(req: &RpcRequest, context: RpcApiContext) -> Result<Value, RpcErr> {
    req.require_ubt_namespace()?;
    match req.method.as_str() {
        "ubt_latestSeq" => LatestSeqRequest::call(req, context),
        "ubt_getEvent" => GetEventRequest::call(req, context),
        "ubt_getEvents" => GetEventsRequest::call(req, context),
        "ubt_compactOutboxBelow" => CompactOutboxBelowRequest::call(req, context),
        "ubt_status" => StatusRequest::call(req, context),
        other => Err(RpcErr::MethodNotFound(other.to_string())),
    }
}
