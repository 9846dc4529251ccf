//! Example: resolve a small multi-module project against an in-memory catalog.
//!
//! Builds a handful of modules with a shared transitive dependency, runs the resolver, and
//! prints the resulting component list in the order it was assembled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use modgraph_resolve::{
    resolve, ComponentKey, ComponentMetadata, ComponentSelector, ConfigurationMetadata,
    ContextResolver, DefaultAttributeMatcher, DependencyDeclaration, DependencyGraphVisitor,
    EdgeState, HighestVersionWins, IdResolveFailure, IdResolveResult, IdResolver,
    InlineOperationQueue, ModuleId, ModuleReplacementsData, ModuleVersionId, MetadataResolver,
    NodeState, ResolveCollaborators, Version, VersionConstraint, VersionSelector,
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

struct PrintingVisitor;

impl DependencyGraphVisitor for PrintingVisitor {
    fn start(&mut self, _root: modgraph_resolve::ComponentId) {
        println!("Resolved graph:");
    }

    fn visit_selector(&mut self, _selector: &modgraph_resolve::SelectorState) {}

    fn visit_node(&mut self, node: &NodeState) {
        println!("  {} ({})", node.component, node.configuration);
    }

    fn visit_edges(&mut self, _node: &NodeState, edges: &[&EdgeState]) {
        for edge in edges {
            if let Some(target) = edge.target {
                println!("    -> {target}");
            }
        }
    }

    fn finish(&mut self, _root: modgraph_resolve::ComponentId) {}
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut catalog = Catalog::default();
    catalog.add("logging", "2.3.0", configuration(vec![]));
    catalog.add(
        "http-client",
        "4.1.0",
        configuration(vec![depends_on("logging", VersionConstraint::prefer(VersionSelector::range(">=2.0.0").unwrap()))]),
    );
    catalog.add(
        "metrics",
        "1.0.0",
        configuration(vec![depends_on("logging", VersionConstraint::prefer(VersionSelector::range(">=2.2.0").unwrap()))]),
    );

    let root = configuration(vec![
        depends_on("http-client", VersionConstraint::prefer(VersionSelector::Latest)),
        depends_on("metrics", VersionConstraint::prefer(VersionSelector::Latest)),
    ]);

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

    let mut visitor = PrintingVisitor;
    match resolve(collaborators, &mut visitor) {
        Ok(graph) => println!("\n{} components resolved, root = {}", graph.order.len(), graph.root),
        Err(err) => eprintln!("resolve failed: {err}"),
    }
}
