use crate::k8s::Object;
use anyhow::anyhow;
use async_trait::async_trait;
use crds::APIRule;
use futures_util::future::BoxFuture;
use futures_util::TryStreamExt;
use kube::runtime::watcher::Event;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource, ResourceExt};
use log::{debug, error, info};
use pingora::server::ShutdownWatch;
use pingora::services::background::BackgroundService;
use std::pin::pin;
use tokio::select;
use tokio::sync::mpsc;

pub struct Service<F>
where
    F: Fn(kube::client::Client, APIRule, ShutdownWatch) -> BoxFuture<'static, Result<(), anyhow::Error>>
        + Send
        + Sync
        + 'static,
{
    update: F,
    failure: mpsc::Sender<anyhow::Error>,
}

impl<F> Service<F>
where
    F: Fn(kube::client::Client, APIRule, ShutdownWatch) -> BoxFuture<'static, Result<(), anyhow::Error>>
        + Send
        + Sync
        + 'static,
{
    pub fn new(update: F, failure_bus: mpsc::Sender<anyhow::Error>) -> Self {
        Self {
            update,
            failure: failure_bus,
        }
    }

    async fn fail(&self, err: anyhow::Error) {
        if let Err(e) = self.failure.clone().send(err).await {
            error!("Error sending error result failure channel: {}", e);
        }
    }
}

#[async_trait]
impl<F> BackgroundService for Service<F>
where
    F: Fn(kube::client::Client, APIRule, ShutdownWatch) -> BoxFuture<'static, Result<(), anyhow::Error>>
        + Send
        + Sync
        + 'static,
{
    async fn start(&self, mut shutdown: ShutdownWatch) {
        info!("Starting APIRule watch service");

        let client = match kube::client::Client::try_default().await {
            Ok(c) => c,
            Err(e) => {
                self.fail(anyhow!("unable to create Kubernetes client: {}", e))
                    .await;
                return;
            }
        };

        debug!("Kubernetes client acquisition successful");
        let mut watch = match create::<APIRule>(client.clone(), watcher::Config::default()).await
        {
            Ok(w) => w,
            Err(e) => {
                self.fail(anyhow!("unable to create Kubernetes watcher: {}", e))
                    .await;
                return;
            }
        };

        loop {
            select! {
                _ = shutdown.changed() => {
                    info!("Stopping APIRule watch service");
                    break;
                }
                event = watch.recv() => match event {
                    Some(event) => {
                        debug!("Received a watch event");

                        let rules = match event {
                            // Owned objects are garbage collected by the cluster.
                            Event::Deleted(rule) => {
                                debug!("APIRule {} deleted", rule.name_any());
                                continue;
                            }
                            Event::Applied(rule) => vec![rule],
                            Event::Restarted(rules) => rules,
                        };

                        for rule in rules {
                            if let Err(e) = (self.update)(client.clone(), rule, shutdown.clone()).await {
                                error!("Error reconciling APIRule: {:#}", e);
                            }
                        }
                    },
                    None => {
                        self.fail(anyhow!("APIRule watch stream ended")).await;
                        break;
                    }
                }
            }
        }
    }
}

pub async fn create<T: Object>(
    client: kube::client::Client,
    config: watcher::Config,
) -> Result<mpsc::Receiver<Event<T>>, anyhow::Error>
where
    <T as Resource>::DynamicType: Default,
{
    let api = Api::all(client);
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let stream = watcher(api, config).default_backoff();
        let mut stream = pin!(stream);
        loop {
            match stream.try_next().await {
                Ok(Some(event)) => {
                    if tx.send(event).await.is_err() {
                        debug!("Watch receiver dropped, stopping stream");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Unable to read from stream: {}", e);
                }
            }
        }
    });
    Ok(rx)
}
