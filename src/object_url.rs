use super::ObjectStorageConfig;
use url::Url;

/// 对象访问地址解析器
///
/// 如果配置了自定义域名，则使用 `{domain}/{object_name}`，
/// 否则使用默认的虚拟主机风格地址 `https://{bucket}.{endpoint}/{object_name}`。
///
/// 带协议的接入点会按照 URL 规范化：协议，路径和协议默认端口会被去掉，主机名转为小写，
/// 例如 `HTTPS://OSS.Example.com:443/v1` 将使用 `oss.example.com`。
/// 不带协议的接入点仅去掉末尾的 `/`。
#[derive(Debug, Clone)]
pub struct ObjectUrlResolver {
    base: String,
}

impl ObjectUrlResolver {
    /// 根据对象存储配置创建对象访问地址解析器
    pub fn new(config: &ObjectStorageConfig) -> Self {
        let base = if let Some(domain) = config.domain() {
            domain.trim_end_matches('/').to_owned()
        } else {
            format!(
                "https://{}.{}",
                config.bucket_name(),
                strip_scheme(config.endpoint())
            )
        };
        Self { base }
    }

    /// 解析对象访问地址
    #[inline]
    pub fn resolve(&self, object_name: &str) -> String {
        format!("{}/{}", self.base, object_name)
    }
}

/// 获取接入点的主机名和非默认端口
fn strip_scheme(endpoint: &str) -> String {
    match Url::parse(endpoint) {
        Ok(url) if url.has_host() => {
            let mut host = url.host_str().unwrap_or_default().to_owned();
            if let Some(port) = url.port() {
                host.push(':');
                host.push_str(&port.to_string());
            }
            host
        }
        _ => endpoint.trim_end_matches('/').to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::{super::Credential, *};

    fn config(endpoint: &str, domain: Option<&str>) -> ObjectStorageConfig {
        let mut builder = ObjectStorageConfig::builder(endpoint, "mybucket", Credential::new("ak", "sk"));
        if let Some(domain) = domain {
            builder.domain(domain);
        }
        builder.build()
    }

    #[test]
    fn test_resolve_default_url() {
        let resolver = ObjectUrlResolver::new(&config("http://oss-cn-test.aliyuncs.com", None));
        assert_eq!(
            resolver.resolve("a/b.txt"),
            "https://mybucket.oss-cn-test.aliyuncs.com/a/b.txt"
        );

        let resolver = ObjectUrlResolver::new(&config("https://oss-cn-test.aliyuncs.com/", None));
        assert_eq!(
            resolver.resolve("a/b.txt"),
            "https://mybucket.oss-cn-test.aliyuncs.com/a/b.txt"
        );

        let resolver = ObjectUrlResolver::new(&config("oss-cn-test.aliyuncs.com", None));
        assert_eq!(
            resolver.resolve("a/b.txt"),
            "https://mybucket.oss-cn-test.aliyuncs.com/a/b.txt"
        );

        let resolver = ObjectUrlResolver::new(&config("http://127.0.0.1:9000", None));
        assert_eq!(resolver.resolve("x"), "https://mybucket.127.0.0.1:9000/x");
    }

    #[test]
    fn test_endpoint_with_scheme_is_normalized() {
        let resolver = ObjectUrlResolver::new(&config("HTTPS://OSS-CN-Test.Aliyuncs.com:443/v1/", None));
        assert_eq!(resolver.resolve("x"), "https://mybucket.oss-cn-test.aliyuncs.com/x");

        let resolver = ObjectUrlResolver::new(&config("http://oss-cn-test.aliyuncs.com:80", None));
        assert_eq!(resolver.resolve("x"), "https://mybucket.oss-cn-test.aliyuncs.com/x");

        let resolver = ObjectUrlResolver::new(&config("https://oss-cn-test.aliyuncs.com:8443", None));
        assert_eq!(resolver.resolve("x"), "https://mybucket.oss-cn-test.aliyuncs.com:8443/x");

        let resolver = ObjectUrlResolver::new(&config("OSS-CN-Test.aliyuncs.com/", None));
        assert_eq!(resolver.resolve("x"), "https://mybucket.OSS-CN-Test.aliyuncs.com/x");
    }

    #[test]
    fn test_resolve_custom_domain() {
        let resolver = ObjectUrlResolver::new(&config(
            "http://oss-cn-test.aliyuncs.com",
            Some("https://cdn.example.com"),
        ));
        assert_eq!(resolver.resolve("a/b.txt"), "https://cdn.example.com/a/b.txt");

        let resolver = ObjectUrlResolver::new(&config("whatever", Some("https://cdn.example.com/")));
        assert_eq!(resolver.resolve("a/b.txt"), "https://cdn.example.com/a/b.txt");
    }

    #[test]
    fn test_empty_domain_falls_back_to_default() {
        let resolver = ObjectUrlResolver::new(&config("http://oss-cn-test.aliyuncs.com", Some("")));
        assert_eq!(
            resolver.resolve("a/b.txt"),
            "https://mybucket.oss-cn-test.aliyuncs.com/a/b.txt"
        );
    }
}
