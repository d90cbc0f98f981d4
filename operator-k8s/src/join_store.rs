use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crd_api::v1alpha1::{App, Instance, User};

/// A `namespace/name` key, used throughout the engine to identify observed objects.
pub type NamespacedName = String;

/// Resolve a (possibly unqualified) reference relative to `namespace`.
///
/// An unqualified reference (no `/`) is interpreted as living in `namespace`;
/// an already-qualified `namespace/name` reference is taken verbatim.
pub(crate) fn resolve(namespace: &str, reference: &str) -> NamespacedName {
    if reference.contains('/') {
        reference.to_owned()
    } else {
        format!("{namespace}/{reference}")
    }
}

#[derive(Debug, Default)]
struct AppEntry {
    obj: Option<App>,
    instances: HashSet<NamespacedName>,
}

#[derive(Debug, Default)]
struct UserEntry {
    obj: Option<User>,
    instances: HashSet<NamespacedName>,
}

#[derive(Debug, Default)]
struct Inner {
    apps: HashMap<NamespacedName, AppEntry>,
    users: HashMap<NamespacedName, UserEntry>,
    instances: HashMap<NamespacedName, Instance>,
}

/// Process-wide in-memory join cache over observed App, User, and Instance
/// objects, plus the bidirectional edges between them.
///
/// The store is a cache only: the cluster API server remains the system of
/// record, and the store must be fully reconstructible from a fresh watch
/// replay. All mutators serialize under a single lock; readers copy values
/// out rather than holding the lock across a cluster API call.
#[derive(Debug, Default, Clone)]
pub struct JoinStore {
    inner: Arc<RwLock<Inner>>,
}

impl JoinStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest observed App; returns the Instances currently edged to it.
    pub fn upsert_app(&self, name: &NamespacedName, app: App) -> Vec<Instance> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let entry = inner.apps.entry(name.clone()).or_default();
        entry.obj = Some(app);
        let edged = entry.instances.clone();
        Self::collect_instances(&inner, &edged)
    }

    /// Store the latest observed User; returns the Instances currently edged to it.
    pub fn upsert_user(&self, name: &NamespacedName, user: User) -> Vec<Instance> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let entry = inner.users.entry(name.clone()).or_default();
        entry.obj = Some(user);
        let edged = entry.instances.clone();
        Self::collect_instances(&inner, &edged)
    }

    /// Store the latest observed Instance and wire its edges into the App and
    /// User tables, creating placeholder entries if those have not been
    /// observed yet.
    pub fn upsert_instance(&self, name: &NamespacedName, inst: Instance) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let app_name = resolve(inst_namespace(&name), &inst.spec.app_name);
        let user_name = resolve(inst_namespace(&name), &inst.spec.user_name);
        inner.apps.entry(app_name).or_default().instances.insert(name.clone());
        inner.users.entry(user_name).or_default().instances.insert(name.clone());
        inner.instances.insert(name.clone(), inst);
    }

    /// Remove an App and return the Instances that were edged to it (so the
    /// caller can issue a derivative-delete for each).
    pub fn delete_app(&self, name: &NamespacedName) -> Vec<Instance> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let edged = inner
            .apps
            .remove(name)
            .map(|e| e.instances)
            .unwrap_or_default();
        Self::collect_instances(&inner, &edged)
    }

    /// Remove a User and return the Instances that were edged to it.
    pub fn delete_user(&self, name: &NamespacedName) -> Vec<Instance> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let edged = inner
            .users
            .remove(name)
            .map(|e| e.instances)
            .unwrap_or_default();
        Self::collect_instances(&inner, &edged)
    }

    /// Remove an Instance and its edges from the App and User tables,
    /// returning the removed Instance (so the caller can garbage-collect
    /// its derivatives even though the cluster object itself is already gone).
    pub fn delete_instance(&self, name: &NamespacedName) -> Option<Instance> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let inst = inner.instances.remove(name)?;
        let app_name = resolve(inst_namespace(name), &inst.spec.app_name);
        let user_name = resolve(inst_namespace(name), &inst.spec.user_name);
        if let Some(entry) = inner.apps.get_mut(&app_name) {
            entry.instances.remove(name);
        }
        if let Some(entry) = inner.users.get_mut(&user_name) {
            entry.instances.remove(name);
        }
        Some(inst)
    }

    /// Look up the App and User joined to an Instance. Either side is `None`
    /// if that object has not yet been observed.
    pub fn join(&self, inst: &Instance, namespace: &str) -> (Option<App>, Option<User>) {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let app_name = resolve(namespace, &inst.spec.app_name);
        let user_name = resolve(namespace, &inst.spec.user_name);
        let app = inner.apps.get(&app_name).and_then(|e| e.obj.clone());
        let user = inner.users.get(&user_name).and_then(|e| e.obj.clone());
        (app, user)
    }

    fn collect_instances(inner: &Inner, names: &HashSet<NamespacedName>) -> Vec<Instance> {
        names
            .iter()
            .filter_map(|name| inner.instances.get(name).cloned())
            .collect()
    }
}

/// Extract the namespace half of a `namespace/name` key.
fn inst_namespace(name: &str) -> &str {
    name.split_once('/').map_or(name, |(ns, _)| ns)
}

#[cfg(test)]
mod test {
    use super::*;
    use crd_api::v1alpha1::{AppSpec, InstanceSpec, UserSpec};
    use kube::Resource;

    fn app(name: &str, namespace: &str) -> App {
        App::new(
            name,
            AppSpec {
                app_class_name: "notebook".to_owned(),
                source_text: String::new(),
                services: vec![],
            },
        )
        .set_namespace(namespace)
    }

    fn user(name: &str, namespace: &str) -> User {
        let mut u = User::new(name, UserSpec { user_handle: None });
        u.meta_mut().namespace = Some(namespace.to_owned());
        u
    }

    fn instance(app_name: &str, user_name: &str) -> Instance {
        Instance::new(
            "inst",
            InstanceSpec {
                app_name: app_name.to_owned(),
                user_name: user_name.to_owned(),
                resources: Default::default(),
                security_context: None,
                run_as_user: None,
                run_as_group: None,
                fs_group: None,
                supplemental_groups: vec![],
            },
        )
    }

    trait SetNamespace {
        fn set_namespace(self, ns: &str) -> Self;
    }

    impl SetNamespace for App {
        fn set_namespace(mut self, ns: &str) -> Self {
            self.meta_mut().namespace = Some(ns.to_owned());
            self
        }
    }

    #[test]
    fn resolve_qualifies_bare_names() {
        assert_eq!(resolve("default", "jupyter"), "default/jupyter");
        assert_eq!(resolve("default", "other/jupyter"), "other/jupyter");
    }

    #[test]
    fn upsert_instance_before_app_leaves_placeholder() {
        let store = JoinStore::new();
        let inst = instance("jupyter", "alice");
        store.upsert_instance(&"default/inst".to_owned(), inst.clone());
        let (app, user) = store.join(&inst, "default");
        assert!(app.is_none());
        assert!(user.is_none());
    }

    #[test]
    fn upsert_app_after_instance_returns_edged_instance() {
        let store = JoinStore::new();
        let inst = instance("jupyter", "alice");
        store.upsert_instance(&"default/inst".to_owned(), inst.clone());
        let edged = store.upsert_app(&"default/jupyter".to_owned(), app("jupyter", "default"));
        assert_eq!(edged.len(), 1);
        let (app, _user) = store.join(&inst, "default");
        assert!(app.is_some());
    }

    #[test]
    fn delete_app_returns_edged_instances_and_clears_join() {
        let store = JoinStore::new();
        let inst = instance("jupyter", "alice");
        store.upsert_instance(&"default/inst".to_owned(), inst.clone());
        let _ = store.upsert_app(&"default/jupyter".to_owned(), app("jupyter", "default"));
        let edged = store.delete_app(&"default/jupyter".to_owned());
        assert_eq!(edged.len(), 1);
        let (app, _user) = store.join(&inst, "default");
        assert!(app.is_none());
    }

    #[test]
    fn delete_instance_removes_edges() {
        let store = JoinStore::new();
        let inst = instance("jupyter", "alice");
        store.upsert_instance(&"default/inst".to_owned(), inst);
        store.delete_instance(&"default/inst".to_owned());
        let edged = store.upsert_app(&"default/jupyter".to_owned(), app("jupyter", "default"));
        assert!(edged.is_empty());
    }
}
