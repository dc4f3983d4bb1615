#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    file: TestFile,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, file: TestFile) -> Self {
        Self { name, group, file }
    }

    pub fn small(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::Small, file)
    }

    pub fn normal(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::Normal, file)
    }

    pub fn large(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::Large, file)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    pub fn file_name(&self) -> &'static str {
        self.file().file_name
    }
}

/// A request body fixture and the `Content-Type` it is sent with
#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content_type: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const fn new(file_name: &'static str, content_type: &'static str, content: &'static str) -> Self {
        Self { file_name, content_type, content }
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    /// The content with `\r\n` line endings, as it travels on the wire
    pub fn wire_content(&self) -> Vec<u8> {
        self.content.replace('\n', "\r\n").into_bytes()
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}
