//! HTML bodies for outgoing mail.

pub fn login_code_email(username: &str, code: &str) -> String {
    format!(
        r#"
<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: 'Helvetica Neue', Helvetica, Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #ddd; border-radius: 8px; }}
        .header {{ background-color: #ffeaa7; padding: 15px; border-radius: 8px 8px 0 0; text-align: center; }}
        .header h1 {{ margin: 0; color: #2d3436; }}
        .code {{ font-size: 32px; letter-spacing: 8px; font-weight: bold; text-align: center; margin: 20px 0; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #b2bec3; text-align: center; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>Poultry Farm</h1>
        </div>
        <p>Hello {username},</p>
        <p>Your account is ready. Use this code to sign in from the farm terminal:</p>
        <div class="code">{code}</div>
        <p>Keep it private; anyone holding it can sign in as you.</p>
        <div class="footer">You received this because an account was registered with this address.</div>
    </div>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    #[test]
    fn code_and_name_are_rendered() {
        let html = super::login_code_email("keeper", "4821");
        assert!(html.contains("Hello keeper,"));
        assert!(html.contains(r#"<div class="code">4821</div>"#));
    }
}
