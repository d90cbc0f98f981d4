use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crd_api::v1alpha1::{App, Instance, User};
use futures::StreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::PostParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, Config as KubeClientConfig, CustomResourceExt};
use tracing::{debug, info, warn};

use crate::config::{Config, Namespace};
use crate::controller::{app, instance, user, Context};
use crate::join_store::JoinStore;
use crate::router;
use crate::template::TemplateEngine;

/// The top-level `helx-operator` process: wires the Join Store, Template
/// Engine, three per-kind controllers, and the health/metrics HTTP server
/// together, and drives them all to completion under one shutdown signal.
pub struct Operator {
    config: Config,
}

impl Operator {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the operator until shutdown.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the cluster client cannot be built, CRD management
    /// fails, or the health server cannot bind.
    pub async fn run(&self) -> Result<()> {
        let client = self.build_client().await?;
        if self.config.manage_crds {
            self.prepare_crds(&client).await?;
        }

        let engine = TemplateEngine::load(&self.config.template_dir)?;
        let store = JoinStore::new();
        let ctx = Arc::new(Context {
            client: client.clone(),
            store,
            engine,
            requeue: Duration::from_secs(self.config.requeue_after_secs),
        });

        let readiness = router::Readiness::new();
        crate::metrics::init();

        let (app_api, user_api, instance_api): (Api<App>, Api<User>, Api<Instance>) =
            match &self.config.namespace {
                Namespace::Single(namespace) => (
                    Api::namespaced(client.clone(), namespace),
                    Api::namespaced(client.clone(), namespace),
                    Api::namespaced(client.clone(), namespace),
                ),
                Namespace::ClusterWide => (
                    Api::all(client.clone()),
                    Api::all(client.clone()),
                    Api::all(client.clone()),
                ),
            };

        let graceful_shutdown_event = event_listener::Event::new();
        let forceful_shutdown = async {
            info!("press ctrl+c to shut down gracefully");
            let _ctrl_c = tokio::signal::ctrl_c().await;
            graceful_shutdown_event.notify(usize::MAX);
            info!("graceful shutdown already requested, press ctrl+c again to force shut down");
            let _ctrl_c_c = tokio::signal::ctrl_c().await;
        };

        let app_controller = Controller::new(app_api, watcher::Config::default())
            .run(app::reconcile, app::error_policy, Arc::clone(&ctx))
            .for_each(|res| async move {
                if let Err(err) = res {
                    warn!(%err, "app controller stream error");
                }
            });
        let user_controller = Controller::new(user_api, watcher::Config::default())
            .run(user::reconcile, user::error_policy, Arc::clone(&ctx))
            .for_each(|res| async move {
                if let Err(err) = res {
                    warn!(%err, "user controller stream error");
                }
            });
        let instance_controller = Controller::new(instance_api, watcher::Config::default())
            .run(instance::reconcile, instance::error_policy, Arc::clone(&ctx))
            .for_each(|res| async move {
                if let Err(err) = res {
                    warn!(%err, "instance controller stream error");
                }
            });

        readiness.mark_ready();
        let health_server = self.health_server(readiness);

        tokio::pin!(forceful_shutdown);
        tokio::pin!(health_server);
        tokio::pin!(app_controller);
        tokio::pin!(user_controller);
        tokio::pin!(instance_controller);

        let mut health_shutdown = false;
        let mut app_shutdown = false;
        let mut user_shutdown = false;
        let mut instance_shutdown = false;

        loop {
            tokio::select! {
                _ = &mut forceful_shutdown => {
                    warn!("forceful shutdown");
                    break;
                }
                res = &mut health_server, if !health_shutdown => {
                    res?;
                    health_shutdown = true;
                    info!("health server graceful shutdown");
                }
                _ = &mut app_controller, if !app_shutdown => {
                    app_shutdown = true;
                    info!("app controller graceful shutdown");
                }
                _ = &mut user_controller, if !user_shutdown => {
                    user_shutdown = true;
                    info!("user controller graceful shutdown");
                }
                _ = &mut instance_controller, if !instance_shutdown => {
                    instance_shutdown = true;
                    info!("instance controller graceful shutdown");
                }
            }

            if health_shutdown && app_shutdown && user_shutdown && instance_shutdown {
                break;
            }
        }

        Ok(())
    }

    /// Build the cluster client, loading `--kubeconfig` when set and
    /// falling back to the in-cluster config otherwise.
    async fn build_client(&self) -> Result<Client> {
        if self.config.kubeconfig.is_empty() {
            return Ok(Client::try_default().await?);
        }
        let kubeconfig = Kubeconfig::read_from(&self.config.kubeconfig)?;
        let config =
            KubeClientConfig::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await?;
        Ok(Client::try_from(config)?)
    }

    /// Create each CRD that is missing on the cluster.
    ///
    /// Does not replicate a multi-version migration path: this engine
    /// ships exactly one schema variant per kind, so a missing CRD is
    /// created and an existing one is left untouched.
    async fn prepare_crds(&self, client: &Client) -> Result<()> {
        let crd_api: Api<CustomResourceDefinition> = Api::all(client.clone());
        for (name, definition) in [
            (App::crd_name(), App::crd()),
            (User::crd_name(), User::crd()),
            (Instance::crd_name(), Instance::crd()),
        ] {
            if crd_api.get_opt(name).await?.is_some() {
                debug!(%name, "crd already present");
                continue;
            }
            info!(%name, "creating crd");
            let _crd = crd_api.create(&PostParams::default(), &definition).await?;
        }
        Ok(())
    }

    async fn health_server(&self, readiness: router::Readiness) -> Result<()> {
        let app = router::build(readiness);
        axum::Server::bind(&self.config.listen_addr.parse()?)
            .serve(app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        Ok(())
    }

    /// Print the CRD YAML for every observed kind to stdout.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a CRD definition fails to serialize.
    pub fn generate_crds(&self) -> Result<()> {
        for definition in [App::crd(), User::crd(), Instance::crd()] {
            println!("{}", serde_yaml::to_string(&definition)?);
            println!("---");
        }
        Ok(())
    }
}
