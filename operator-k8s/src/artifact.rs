use std::collections::BTreeMap;

use crd_api::v1alpha1::{App, Instance, User};
use kube::ResourceExt;
use operator_api::{Container, PortMap, RenderArtifact, Resources, System};
use serde::Serialize;
use tracing::warn;

use crate::consts::{TEMPLATE_DEPLOYMENT, TEMPLATE_PVC, TEMPLATE_SERVICE};
use crate::join_store::JoinStore;
use crate::template::TemplateEngine;

/// The three artifact groups produced for one Instance.
#[derive(Debug, Default, Clone)]
pub struct Artifacts {
    pub deployment: Option<RenderArtifact>,
    /// keyed by PVC claim name
    pub pvcs: BTreeMap<String, RenderArtifact>,
    /// keyed by container name
    pub services: BTreeMap<String, RenderArtifact>,
}

/// Join `inst` against the Join Store and render its derived artifacts.
///
/// Returns an empty `Artifacts` (not an error) when the joined App or User
/// has not yet been observed; the missing side triggers generation once it
/// arrives.
///
/// Holds `engine`'s generation lock for the duration of the call: the shared
/// template `Storage` table is cleared and repopulated here, so two
/// concurrent calls on the same engine must not interleave.
pub async fn generate_artifacts(
    store: &JoinStore,
    engine: &TemplateEngine,
    inst: &Instance,
) -> Artifacts {
    let lock = engine.generation_lock();
    let _guard = lock.lock().await;
    generate_artifacts_locked(store, engine, inst)
}

fn generate_artifacts_locked(store: &JoinStore, engine: &TemplateEngine, inst: &Instance) -> Artifacts {
    let namespace = inst.namespace().unwrap_or_default();
    let (app, user) = store.join(inst, &namespace);
    let (Some(app), Some(user)) = (app, user) else {
        return Artifacts::default();
    };

    let guid = inst.status.as_ref().map_or("", |s| s.uuid.as_str());
    let system = build_system(inst, &app, &user, guid);

    engine.storage().clear();

    let mut artifacts = Artifacts::default();

    artifacts.deployment = render_one(engine, TEMPLATE_DEPLOYMENT, &system).ok();

    for (name, volume) in &system.volumes {
        if volume.scheme != operator_api::consts::SCHEME_PVC {
            continue;
        }
        let Some(claim) = volume.attr.get("claim") else {
            continue;
        };
        #[derive(Serialize)]
        struct PvcContext<'a> {
            system: &'a System,
            volume: &'a operator_api::Volume,
        }
        let ctx = PvcContext {
            system: &system,
            volume,
        };
        if let Ok(rendered) = render_fixed_point(engine, TEMPLATE_PVC, &ctx, name) {
            let mut attr = BTreeMap::new();
            if operator_api::volume::is_retained(volume) {
                attr.insert("retain".to_owned(), "true".to_owned());
            }
            artifacts
                .pvcs
                .insert(claim.clone(), RenderArtifact { rendered, attr });
        }
    }

    for container in &system.containers {
        #[derive(Serialize)]
        struct ServiceContext<'a> {
            system: &'a System,
            container: &'a Container,
        }
        let ctx = ServiceContext {
            system: &system,
            container,
        };
        if let Ok(rendered) = render_fixed_point(engine, TEMPLATE_SERVICE, &ctx, &container.name) {
            artifacts.services.insert(
                container.name.clone(),
                RenderArtifact {
                    rendered,
                    attr: BTreeMap::new(),
                },
            );
        }
    }

    artifacts
}

fn render_one(
    engine: &TemplateEngine,
    name: &str,
    system: &System,
) -> Result<RenderArtifact, crate::template::TemplateError> {
    #[derive(Serialize)]
    struct DeploymentContext<'a> {
        system: &'a System,
    }
    let rendered = engine.render_to_fixed_point(name, &DeploymentContext { system })?;
    Ok(RenderArtifact {
        rendered,
        attr: BTreeMap::new(),
    })
}

fn render_fixed_point<T: Serialize>(
    engine: &TemplateEngine,
    template: &str,
    ctx: &T,
    label: &str,
) -> Result<String, crate::template::TemplateError> {
    engine.render_to_fixed_point(template, ctx).map_err(|err| {
        warn!(%label, %err, "artifact render failed");
        err
    })
}

fn build_system(inst: &Instance, app: &App, user: &User, guid: &str) -> System {
    let instance_name = inst.name_any();
    let app_name = app.name_any();
    let user_name = user.name_any();

    let mut environment = BTreeMap::new();
    environment.insert(operator_api::consts::ENV_GUID.to_owned(), guid.to_owned());
    environment.insert(
        operator_api::consts::ENV_USER.to_owned(),
        user.spec.user_handle.clone().unwrap_or_default(),
    );
    environment.insert(operator_api::consts::ENV_HOST.to_owned(), String::new());
    environment.insert(
        operator_api::consts::ENV_APP_CLASS_NAME.to_owned(),
        app.spec.app_class_name.clone(),
    );
    environment.insert(operator_api::consts::ENV_APP_NAME.to_owned(), app_name.clone());
    environment.insert(
        operator_api::consts::ENV_INSTANCE_NAME.to_owned(),
        instance_name.clone(),
    );

    let run_as_user = inst
        .spec
        .run_as_user
        .or_else(|| user.status.as_ref().and_then(|s| s.run_as_user));
    let run_as_group = inst
        .spec
        .run_as_group
        .or_else(|| user.status.as_ref().and_then(|s| s.run_as_group));
    let fs_group = inst
        .spec
        .fs_group
        .or_else(|| user.status.as_ref().and_then(|s| s.fs_group));
    let supplemental_groups = if inst.spec.supplemental_groups.is_empty() {
        user.status
            .as_ref()
            .map(|s| {
                s.supplemental_groups
                    .iter()
                    .filter_map(|g| g.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        inst.spec.supplemental_groups.clone()
    };

    let mut containers = Vec::new();
    let mut volumes = BTreeMap::new();

    for service in &app.spec.services {
        let ports: Vec<PortMap> = service
            .ports
            .iter()
            .map(|p| PortMap::new(p.container_port, p.port))
            .collect();
        let has_service = ports.iter().any(|p| p.external_port != 0);

        let mut volume_mounts = Vec::new();
        for (vol_name, spec) in &service.volumes {
            match operator_api::parse_volume_spec(vol_name, spec) {
                Ok((volume, mount)) => {
                    volume_mounts.push(mount);
                    volumes.entry(vol_name.clone()).or_insert(volume);
                }
                Err(err) => {
                    warn!(service = %service.name, volume = %vol_name, %err, "skipping unparsable volume");
                }
            }
        }

        let resources = inst
            .spec
            .resources
            .get(&service.name)
            .map(|r| Resources {
                request: r.request.clone().into_iter().collect(),
                limit: r.limit.clone().into_iter().collect(),
            })
            .unwrap_or_default();

        containers.push(Container {
            name: service.name.clone(),
            image: service.image.clone(),
            command: service.command.clone(),
            environment: service.environment.clone().into_iter().collect(),
            ports,
            has_service,
            resources,
            volume_mounts,
        });
    }

    System {
        app_class_name: app.spec.app_class_name.clone(),
        app_name,
        instance_name,
        guid: guid.to_owned(),
        user_name,
        run_as_user,
        run_as_group,
        fs_group,
        supplemental_groups,
        environment,
        containers,
        volumes,
    }
}
