use crate::{
    models::{EnrichRequest, EnrichResponse},
    pipeline::{Pipeline, PipelineError},
    policy::DeadlinePolicy,
};
use serde::Serialize;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    statuses: Arc<Mutex<JobBook>>,
}

/// Job states plus the order in which jobs finished. Only the newest
/// `history` finished jobs are kept; queued and running jobs always stay.
struct JobBook {
    states: HashMap<Uuid, JobState>,
    finished: VecDeque<Uuid>,
    history: usize,
}

impl JobBook {
    fn new(history: usize) -> Self {
        Self {
            states: HashMap::new(),
            finished: VecDeque::new(),
            history: history.max(1),
        }
    }

    fn finish(&mut self, id: Uuid, state: JobState) {
        self.states.insert(id, state);
        self.finished.push_back(id);
        while self.finished.len() > self.history {
            if let Some(evicted) = self.finished.pop_front() {
                self.states.remove(&evicted);
            }
        }
    }
}

struct Job {
    id: Uuid,
    request: EnrichRequest,
}

#[derive(Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed {
        result: EnrichResponse,
    },
    Failed {
        error: String,
        kind: &'static str,
        phase: &'static str,
    },
}

#[derive(Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    #[serde(flatten)]
    pub state: JobState,
}

impl JobQueue {
    /// One worker, one job at a time, each under the same deadline policy
    /// as a synchronous request. `history` bounds how many finished jobs
    /// remain visible to [`JobQueue::get`].
    pub fn spawn(
        pipeline: Pipeline,
        policy: DeadlinePolicy,
        capacity: usize,
        history: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let statuses = Arc::new(Mutex::new(JobBook::new(history)));
        let statuses_bg = statuses.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                {
                    let mut guard = statuses_bg.lock().await;
                    guard.states.insert(job.id, JobState::Running);
                }

                let request = job.request;
                let result = policy.run(|| pipeline.run(request.clone())).await;
                let state = match result {
                    Ok(result) => {
                        info!(target = "enrich.jobs", job_id = %job.id, "job_completed");
                        JobState::Completed { result }
                    }
                    Err(err) => {
                        warn!(target = "enrich.jobs", job_id = %job.id, phase = err.phase(), error = %err, "job_failed");
                        JobState::Failed {
                            error: err.detail().to_string(),
                            kind: err.kind().as_str(),
                            phase: err.phase(),
                        }
                    }
                };
                statuses_bg.lock().await.finish(job.id, state);
            }
        });

        (Self { tx, statuses }, handle)
    }

    pub async fn enqueue(&self, request: EnrichRequest) -> Result<Uuid, PipelineError> {
        let id = Uuid::new_v4();
        {
            let mut guard = self.statuses.lock().await;
            guard.states.insert(id, JobState::Queued);
        }
        if self.tx.send(Job { id, request }).await.is_err() {
            self.statuses.lock().await.states.remove(&id);
            return Err(PipelineError::internal("enqueue", "worker not available"));
        }
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<JobInfo> {
        let guard = self.statuses.lock().await;
        guard.states.get(&id).cloned().map(|state| JobInfo {
            id: id.to_string(),
            state,
        })
    }
}
