/// Settings for the threads backing coroutine bodies.
#[derive(Clone, Debug)]
pub struct CoConfig {
    pub stack_size: usize,
    pub name_prefix: String,
}

impl Default for CoConfig {
    fn default() -> Self {
        CoConfig {
            stack_size: 2 * 1024 * 1024,
            name_prefix: "coroutine".to_string(),
        }
    }
}

impl CoConfig {
    pub(crate) fn thread_name(&self, id: u64) -> String {
        format!("{}-{}", self.name_prefix, id)
    }
}
