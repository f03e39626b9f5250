use std::sync::Arc;

use lazy_registry::logging::init_logging;
use lazy_registry::*;

// Define regular traits and implementor structs

trait Logger: Send + Sync {
    fn log(&self, content: &str);
}

struct StdoutLogger;

impl Logger for StdoutLogger {
    fn log(&self, content: &str) {
        println!("{}", content);
    }
}

struct MainClass {
    logger: Arc<Box<dyn Logger>>,
    greeting: Arc<String>,
}

impl MainClass {
    fn run(&self) {
        self.logger.log(&self.greeting);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::new().load()?;
    init_logging(&config.logging)?;

    // Rust factories that loaded sources refer to by symbol
    let catalog = NativeCatalog::new()
        .register(
            "stdout_logger",
            Factory::from_fn(|| Box::new(StdoutLogger) as Box<dyn Logger>),
        )
        .register(
            "main_class",
            Factory::from_fn(|logger: Arc<Box<dyn Logger>>, greeting: Arc<String>| MainClass {
                logger,
                greeting,
            })
            .with_signature("function (Logger, Greeting)")?,
        );

    // Sources, as a web server would serve them from its `js/` directory
    let sources = StaticLoader::new()
        .with_source("js/MainClass.js", "define = main_class")
        .with_source("js/Logger.js", "define = stdout_logger")
        .with_source("js/Greeting.js", "put Greeting = \"Hello world\"");

    let registry = ObjectRegistry::builder()
        .config(config)
        .loader(sources)
        .catalog(catalog)
        .locator(|name: &str| format!("js/{name}.js"))
        .build();

    // The greeting is an existing instance: no source is loaded for it
    registry.put("Greeting", "Hello from main".to_string());

    // MainClass and Logger are loaded on demand, then created once
    let main: Arc<MainClass> = registry.get_as("MainClass").await?;
    main.run();

    let again: Arc<MainClass> = registry.get_as("MainClass").await?;
    assert!(Arc::ptr_eq(&main, &again));

    Ok(())
}
