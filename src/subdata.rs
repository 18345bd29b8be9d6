/// 内置的子域名字典，未指定字典文件时使用
pub fn get_default_sub_next_data() -> Vec<&'static str> {
    vec![
        "www", "mail", "ftp", "localhost", "webmail", "smtp", "pop", "ns1", "ns2", "ns3",
        "webdisk", "cpanel", "whm", "autodiscover", "autoconfig", "m", "imap", "test", "ns", "blog",
        "pop3", "dev", "www2", "admin", "forum", "news", "vpn", "mail2", "new", "mysql",
        "old", "lists", "support", "mobile", "mx", "static", "docs", "beta", "shop", "sql",
        "secure", "demo", "cp", "calendar", "wiki", "web", "media", "email", "images", "img",
        "download", "dns", "dns1", "dns2", "api", "cdn", "stats", "search", "staging", "server",
        "app", "apps", "portal", "video", "sip", "ads", "host", "crm", "cms", "backup",
        "mx1", "mx2", "lyncdiscover", "info", "git", "gitlab", "jenkins", "jira", "confluence", "monitor",
        "office", "exchange", "owa", "remote", "proxy", "gateway", "sso", "auth", "login", "accounts",
        "pay", "payment", "store", "assets", "upload", "files", "file", "db", "redis", "oa",
        "intranet", "internal", "uat", "qa", "pre", "prod", "sandbox", "status", "help", "home",
        "console", "manage", "panel", "dashboard", "m1", "m2", "wap", "bbs", "edu", "hr",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_list_has_no_duplicates() {
        let list = get_default_sub_next_data();
        let set: HashSet<_> = list.iter().collect();
        assert_eq!(set.len(), list.len());
        assert!(list.iter().all(|w| !w.is_empty() && !w.contains('.')));
    }
}
