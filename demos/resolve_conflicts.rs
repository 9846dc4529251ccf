//! Example: demonstrate resolution **failure and conflict** scenarios.
//!
//! Each scenario builds a tiny catalog, runs [`resolve`], and prints what happened: a clean
//! resolve, a missing dependency that fails only its own edge, or a rejected selection that
//! surfaces as a hard validation failure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use modgraph_resolve::{
    resolve, ComponentKey, ComponentMetadata, ComponentSelector, ConfigurationMetadata,
    ContextResolver, DefaultAttributeMatcher, DependencyDeclaration, DependencyGraphVisitor,
    EdgeState, HighestVersionWins, IdResolveFailure, IdResolveResult, IdResolver,
    InlineOperationQueue, ModuleId, ModuleReplacementsData, ModuleVersionId, MetadataResolver,
    NodeState, ResolveCollaborators, SelectorState, Version, VersionConstraint, VersionSelector,
};

#[derive(Default)]
struct Catalog {
    components: HashMap<String, (Version, ComponentMetadata)>,
}

impl Catalog {
    fn add(&mut self, name: &str, version: &str, metadata: ComponentMetadata) {
        self.components.insert(name.to_string(), (Version::parse(version).unwrap(), metadata));
    }
}

struct CatalogIdResolver(Arc<Mutex<Catalog>>);
struct CatalogMetadataResolver(Arc<Mutex<Catalog>>);
struct FixedRoot(ComponentMetadata);

impl IdResolver for CatalogIdResolver {
    fn resolve(&mut self, selector: &ComponentSelector) -> IdResolveResult {
        let catalog = self.0.lock().expect("catalog lock poisoned");
        let Some((version, _)) = catalog.components.get(&selector.module.name) else {
            return IdResolveResult::failed(format!("unknown module {}", selector.module));
        };
        let accepted = selector.constraint.preferred.as_ref().is_none_or(|p| p.accepts(version));
        if !accepted {
            return IdResolveResult::failed(format!("{version} does not satisfy constraint"));
        }
        IdResolveResult::resolved(
            ComponentKey(format!("{}:{version}", selector.module.name)),
            ModuleVersionId { module: selector.module.clone(), version: version.clone() },
        )
    }
}

impl MetadataResolver for CatalogMetadataResolver {
    fn is_fetching_metadata_cheap(&self, _key: &ComponentKey) -> bool {
        true
    }

    fn resolve(&mut self, key: &ComponentKey) -> Result<ComponentMetadata, IdResolveFailure> {
        let name = key.0.split(':').next().unwrap_or_default();
        self.0
            .lock()
            .expect("catalog lock poisoned")
            .components
            .get(name)
            .map(|(_, meta)| meta.clone())
            .ok_or_else(|| IdResolveFailure { message: format!("no metadata for {name}") })
    }
}

impl ContextResolver for FixedRoot {
    fn resolve(&mut self) -> Result<(ComponentKey, ModuleVersionId, ComponentMetadata), IdResolveFailure> {
        Ok((
            ComponentKey("app:1.0.0".into()),
            ModuleVersionId { module: ModuleId::new("demo", "app"), version: Version::new(1, 0, 0) },
            self.0.clone(),
        ))
    }
}

fn depends_on(module: &str, constraint: VersionConstraint) -> DependencyDeclaration {
    DependencyDeclaration { target_module: ModuleId::new("demo", module), constraint, target_configuration: None }
}

fn configuration(deps: Vec<DependencyDeclaration>) -> ComponentMetadata {
    ComponentMetadata {
        configurations: vec![ConfigurationMetadata { name: "default".into(), dependencies: deps, capabilities: vec![] }],
    }
}

fn leaf() -> ComponentMetadata {
    configuration(vec![])
}

struct QuietVisitor;

impl DependencyGraphVisitor for QuietVisitor {
    fn start(&mut self, _root: modgraph_resolve::ComponentId) {}
    fn visit_selector(&mut self, _selector: &SelectorState) {}
    fn visit_node(&mut self, _node: &NodeState) {}
    fn visit_edges(&mut self, _node: &NodeState, _edges: &[&EdgeState]) {}
    fn finish(&mut self, _root: modgraph_resolve::ComponentId) {}
}

fn run(title: &str, root: ComponentMetadata, catalog: Catalog) {
    println!("\n{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));

    let catalog = Arc::new(Mutex::new(catalog));
    let collaborators = ResolveCollaborators {
        context_resolver: Box::new(FixedRoot(root)),
        id_resolver: Box::new(CatalogIdResolver(catalog.clone())),
        metadata_resolver: Arc::new(Mutex::new(Box::new(CatalogMetadataResolver(catalog)) as Box<dyn MetadataResolver>)),
        attribute_matcher: Box::new(DefaultAttributeMatcher),
        module_conflict_resolver: Box::new(HighestVersionWins),
        capabilities_conflict_resolver: Box::new(HighestVersionWins),
        module_replacements: ModuleReplacementsData::new(),
        substitutions: Box::new(()),
        edge_filter: Box::new(()),
        operation_queue: Box::new(InlineOperationQueue),
    };

    let mut visitor = QuietVisitor;
    match resolve(collaborators, &mut visitor) {
        Ok(graph) => println!("  resolved {} components, root = {}", graph.order.len(), graph.root),
        Err(err) => println!("  failed: {err}"),
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    // 1. Missing dependency — the edge fails, the rest of the graph still resolves.
    {
        let mut catalog = Catalog::default();
        catalog.add("present", "1.0.0", leaf());
        let root = configuration(vec![
            depends_on("present", VersionConstraint::prefer(VersionSelector::Latest)),
            depends_on("nonexistent", VersionConstraint::prefer(VersionSelector::Latest)),
        ]);
        run("1. Missing dependency — no candidate in the catalog", root, catalog);
    }

    // 2. Version constraint not satisfied by the only registered version.
    {
        let mut catalog = Catalog::default();
        catalog.add("foo", "1.0.0", leaf());
        let root = configuration(vec![depends_on(
            "foo",
            VersionConstraint::prefer(VersionSelector::range(">=2.0.0").unwrap()),
        )]);
        run("2. Version conflict — needs >=2.0.0, only 1.0.0 exists", root, catalog);
    }

    // 3. Rejected selection — the only available version is explicitly excluded.
    {
        let mut catalog = Catalog::default();
        catalog.add("flaky", "1.5.0", leaf());
        let root = configuration(vec![depends_on(
            "flaky",
            VersionConstraint::prefer(VersionSelector::Latest).with_reject(VersionSelector::reject("=1.5.0").unwrap()),
        )]);
        run("3. Rejected selection — the resolved version is on the reject list", root, catalog);
    }

    // 4. A force selector collapsing a module to one component, resolving cleanly.
    {
        let mut catalog = Catalog::default();
        catalog.add("pinned", "2.0.0", leaf());
        let root = configuration(vec![depends_on(
            "pinned",
            VersionConstraint::forced(VersionSelector::Exact(Version::parse("2.0.0").unwrap())),
        )]);
        run("4. Forced selector — collapses to exactly one candidate", root, catalog);
    }
}
