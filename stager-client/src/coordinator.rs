//! Upload coordinator: drives one file through session, parts and finalize

use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use stager_core::{
    chunk, fit_chunk_size, ObjectKey, PartAuthorization, PartDescriptor, PartReceipt, ReceiptSet, StateMachine,
    UploadSession, UploadState,
};

use crate::progress::percent;
use crate::retry::with_retries;
use crate::{
    ByteSource, ClientError, PartTransmitter, ProgressSink, RetryPolicy, UploadAuthorizer,
    UploadConfig, UploadError, UploadOutcome,
};

/// Orchestrates multipart uploads against an authorizer and a transmitter
pub struct UploadCoordinator<A, T> {
    authorizer: Arc<A>,
    transmitter: Arc<T>,
    config: UploadConfig,
}

impl<A, T> UploadCoordinator<A, T>
where
    A: UploadAuthorizer + 'static,
    T: PartTransmitter + 'static,
{
    pub fn new(authorizer: A, transmitter: T, config: UploadConfig) -> Self {
        UploadCoordinator::from_shared(Arc::new(authorizer), Arc::new(transmitter), config)
    }

    pub fn from_shared(authorizer: Arc<A>, transmitter: Arc<T>, config: UploadConfig) -> Self {
        UploadCoordinator {
            authorizer,
            transmitter,
            config,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload `source` in parts of the configured `chunk_size`, grown only
    /// as far as the part limit requires
    pub async fn upload(
        &self,
        source: Arc<dyn ByteSource>,
        file_name: &str,
        progress: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> UploadOutcome {
        let chunk_size = fit_chunk_size(source.len(), self.config.chunk_size);
        self.start_upload(source, file_name, chunk_size, progress, cancel)
            .await
    }

    /// Upload `source` as `file_name` in parts of `chunk_size` bytes.
    ///
    /// Always resolves to exactly one outcome. Once a session exists the
    /// upload either completes or the session is aborted.
    pub async fn start_upload(
        &self,
        source: Arc<dyn ByteSource>,
        file_name: &str,
        chunk_size: NonZeroU64,
        progress: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> UploadOutcome {
        let span = info_span!("upload", file = %file_name);
        self.run(source, file_name, chunk_size, progress, cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        source: Arc<dyn ByteSource>,
        file_name: &str,
        chunk_size: NonZeroU64,
        progress: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> UploadOutcome {
        let mut machine = StateMachine::new();

        let parts = match chunk(source.len(), chunk_size) {
            Ok(parts) => parts,
            Err(e) => return fail(&mut machine, UploadError::Contract(e)),
        };
        if parts.is_empty() {
            return fail(&mut machine, UploadError::EmptySource);
        }
        if cancel.is_cancelled() {
            return fail(&mut machine, UploadError::Cancelled);
        }

        transition(&mut machine, UploadState::SessionOpening);
        let total_parts = parts.len() as u32;
        info!(
            "Opening session: {} bytes in {} parts of up to {} bytes",
            source.len(),
            total_parts,
            chunk_size
        );

        let opened = match self
            .authorizer
            .open_session(file_name, &self.config.content_type)
            .await
        {
            Ok(opened) => opened,
            Err(e) => return fail(&mut machine, UploadError::SessionOpen(e)),
        };
        let session = match UploadSession::new(opened.object_key, opened.session_id, total_parts) {
            Ok(session) => session,
            Err(e) => return fail(&mut machine, UploadError::Contract(e)),
        };
        info!("Session {} opened for {}", session.session_id(), session.object_key());

        transition(&mut machine, UploadState::Authorizing);
        match self
            .drive(&mut machine, &session, source, &parts, progress, &cancel)
            .await
        {
            Ok(object_key) => {
                transition(&mut machine, UploadState::Completed);
                info!("Upload complete: {}", object_key);
                UploadOutcome::Completed(object_key)
            }
            Err(reason) => self.abort(&mut machine, &session, reason).await,
        }
    }

    /// Authorize, transfer and finalize an open session
    async fn drive(
        &self,
        machine: &mut StateMachine,
        session: &UploadSession,
        source: Arc<dyn ByteSource>,
        parts: &[PartDescriptor],
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ObjectKey, UploadError> {
        let numbers: Vec<u32> = session.part_numbers().collect();
        let authorizer = &self.authorizer;
        let requested = &numbers;

        let granted = tokio::select! {
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            granted = with_retries(&self.config.control_retry, "authorize parts", move || {
                authorizer.authorize_parts(session, requested)
            }) => granted.map_err(UploadError::Authorization)?,
        };
        let authorizations = check_authorizations(&numbers, granted)?;
        debug!("{} parts authorized", authorizations.len());

        transition(machine, UploadState::Transferring);
        let receipts = self
            .transfer(session, source, parts, authorizations, progress, cancel)
            .await?;

        transition(machine, UploadState::Finalizing);
        let ordered = receipts.into_ordered()?;
        let ordered = &ordered;
        info!("All {} parts stored, finalizing", ordered.len());

        with_retries(&self.config.control_retry, "finalize", move || {
            authorizer.finalize(session, ordered)
        })
        .await
        .map_err(UploadError::Finalize)
    }

    /// Run part transfers with at most `concurrency` in flight.
    ///
    /// Receipts flow back through the join set, so the receipt set has a
    /// single owner. The first fatal error stops dispatch; in-flight parts
    /// are drained before returning.
    async fn transfer(
        &self,
        session: &UploadSession,
        source: Arc<dyn ByteSource>,
        parts: &[PartDescriptor],
        mut authorizations: BTreeMap<u32, PartAuthorization>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ReceiptSet, UploadError> {
        let total = session.total_parts();
        let limit = self.config.concurrency.get();
        let stop = cancel.child_token();

        let mut receipts = ReceiptSet::new(total);
        let mut pending = parts.iter().copied();
        let mut in_flight = JoinSet::new();
        let mut failure: Option<UploadError> = None;

        loop {
            while failure.is_none() && !stop.is_cancelled() && in_flight.len() < limit {
                let Some(part) = pending.next() else { break };
                let Some(authorization) = authorizations.remove(&part.part_number) else {
                    failure = Some(UploadError::Authorization(ClientError::InvalidResponse(
                        format!("no authorization for part {}", part.part_number),
                    )));
                    stop.cancel();
                    break;
                };

                debug!("Dispatching part {}/{} ({} bytes)", part.part_number, total, part.len());
                let job = PartJob {
                    part,
                    authorization,
                    session: session.clone(),
                    source: Arc::clone(&source),
                    authorizer: Arc::clone(&self.authorizer),
                    transmitter: Arc::clone(&self.transmitter),
                    retry: self.config.part_retry,
                    stop: stop.clone(),
                };
                in_flight.spawn(job.run().in_current_span());
            }

            let Some(joined) = in_flight.join_next().await else { break };

            match joined {
                Ok((part_number, Ok(receipt))) => {
                    if let Err(e) = receipts.record(receipt) {
                        error!("Part {} produced an unusable receipt: {}", part_number, e);
                        failure.get_or_insert(UploadError::Contract(e));
                        stop.cancel();
                        continue;
                    }
                    let done = receipts.len() as u32;
                    info!("Part {} stored ({}/{})", part_number, done, total);
                    progress.on_progress(percent(done, total));
                }
                Ok((part_number, Err(UploadError::Cancelled))) => {
                    debug!("Part {} stopped before finishing", part_number);
                    failure.get_or_insert(UploadError::Cancelled);
                }
                Ok((part_number, Err(e))) => {
                    error!("Part {} failed: {}", part_number, e);
                    if failure.is_none() {
                        failure = Some(e);
                        stop.cancel();
                        if !in_flight.is_empty() {
                            info!("Waiting for {} in-flight parts to settle", in_flight.len());
                        }
                    }
                }
                Err(e) => {
                    error!("Part worker crashed: {}", e);
                    failure.get_or_insert(UploadError::Worker(e.to_string()));
                    stop.cancel();
                }
            }

            if cancel.is_cancelled() && failure.is_none() {
                info!("Cancellation requested, {} parts still in flight", in_flight.len());
                failure = Some(UploadError::Cancelled);
            }
        }

        if let Some(reason) = failure {
            return Err(reason);
        }
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(receipts)
    }

    /// Abort the session once and resolve to `Aborted(reason)`.
    ///
    /// An abort failure is logged; it never replaces the original reason.
    async fn abort(
        &self,
        machine: &mut StateMachine,
        session: &UploadSession,
        reason: UploadError,
    ) -> UploadOutcome {
        transition(machine, UploadState::Aborting);
        warn!("Aborting session {}: {}", session.session_id(), reason);

        let authorizer = &self.authorizer;
        match with_retries(&self.config.control_retry, "abort", move || authorizer.abort(session)).await {
            Ok(()) => info!("Session {} aborted", session.session_id()),
            Err(e) => warn!(
                "Session {} may be left open: {}",
                session.session_id(),
                UploadError::Abort(e)
            ),
        }

        transition(machine, UploadState::Aborted);
        UploadOutcome::Aborted(reason)
    }
}

fn transition(machine: &mut StateMachine, next: UploadState) {
    match machine.advance(next) {
        Ok(previous) => debug!("State {} -> {}", previous, next),
        Err(e) => {
            error!("{}", e);
            debug_assert!(false, "{}", e);
        }
    }
}

fn fail(machine: &mut StateMachine, reason: UploadError) -> UploadOutcome {
    error!("Upload failed: {}", reason);
    transition(machine, UploadState::Failed);
    UploadOutcome::Failed(reason)
}

/// The backend must authorize exactly the parts that were requested
fn check_authorizations(
    requested: &[u32],
    granted: BTreeMap<u32, PartAuthorization>,
) -> Result<BTreeMap<u32, PartAuthorization>, UploadError> {
    let missing: Vec<u32> = requested
        .iter()
        .copied()
        .filter(|n| !granted.contains_key(n))
        .collect();
    if !missing.is_empty() {
        return Err(UploadError::Authorization(ClientError::InvalidResponse(format!(
            "no authorization for parts {:?}",
            missing
        ))));
    }
    if granted.len() != requested.len() {
        return Err(UploadError::Authorization(ClientError::InvalidResponse(format!(
            "{} authorizations returned for {} parts",
            granted.len(),
            requested.len()
        ))));
    }
    Ok(granted)
}

/// One part's transfer, retried under its own budget
struct PartJob<A, T> {
    part: PartDescriptor,
    authorization: PartAuthorization,
    session: UploadSession,
    source: Arc<dyn ByteSource>,
    authorizer: Arc<A>,
    transmitter: Arc<T>,
    retry: RetryPolicy,
    stop: CancellationToken,
}

impl<A, T> PartJob<A, T>
where
    A: UploadAuthorizer + 'static,
    T: PartTransmitter + 'static,
{
    async fn run(mut self) -> (u32, Result<PartReceipt, UploadError>) {
        let part_number = self.part.part_number;
        let result = self.transfer().await;
        (part_number, result)
    }

    async fn transfer(&mut self) -> Result<PartReceipt, UploadError> {
        let part_number = self.part.part_number;
        if self.stop.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let read = tokio::select! {
            _ = self.stop.cancelled() => return Err(UploadError::Cancelled),
            read = self.source.read_range(self.part.range()) => read,
        };
        let body = read.map_err(|cause| UploadError::Source { part_number, cause })?;

        let mut attempt = 0;
        let mut reauthorize = false;
        loop {
            attempt += 1;
            if reauthorize || self.authorization.is_expired() {
                self.authorization = self.refresh_authorization().await?;
            }

            let sent = tokio::select! {
                _ = self.stop.cancelled() => return Err(UploadError::Cancelled),
                sent = self.transmitter.transmit(&self.authorization, body.clone()) => sent,
            };

            let cause = match sent {
                Ok(receipt) => return Ok(receipt),
                Err(cause) => cause,
            };
            if attempt > self.retry.max_retries {
                return Err(UploadError::Transfer { part_number, cause });
            }

            reauthorize = cause.is_authorization_rejected();
            let delay = self.retry.delay_for(attempt);
            warn!(
                "Part {} attempt {}/{} failed: {}; retrying in {:?}",
                part_number,
                attempt,
                self.retry.attempts(),
                cause,
                delay
            );
            tokio::select! {
                _ = self.stop.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Fresh authorization for this part only
    async fn refresh_authorization(&self) -> Result<PartAuthorization, UploadError> {
        let part_number = self.part.part_number;
        info!("Refreshing authorization for part {}", part_number);

        let numbers = [part_number];
        let granted = tokio::select! {
            _ = self.stop.cancelled() => return Err(UploadError::Cancelled),
            granted = self.authorizer.authorize_parts(&self.session, &numbers) => granted,
        };
        granted
            .map_err(UploadError::Authorization)?
            .remove(&part_number)
            .ok_or_else(|| {
                UploadError::Authorization(ClientError::InvalidResponse(format!(
                    "no authorization for part {}",
                    part_number
                )))
            })
    }
}
